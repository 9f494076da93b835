//! Middleware chain driving a decode.
//!
//! A [`Pipeline`] is an immutable linked list of [`Middleware`] nodes built
//! once per image directory. Invoking it hands a [`DecodeContext`] to the
//! first node together with a [`Next`] handle for the rest of the chain.
//! A middleware may adjust the context, derive a new one, call `next` any
//! number of times (once per strile for the enumerators), or stop.
//!
//! ```text
//! [blocker] → [orientation] → enumerator → [dispatcher] → [exclusive]
//!     → decompression → [fill order] → [subsampling] → [predictor]
//!     → photometric
//! ```

mod cancel;
mod context;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DecodeError;

pub use cancel::CancellationToken;
pub use context::{DecodeContext, DecodeParameters, Destination, ParallelExtension};

/// One stage of the decode pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Stage name, used in logs and diagnostics.
    fn name(&self) -> &'static str;

    async fn invoke(&self, ctx: &mut DecodeContext, next: &Next) -> Result<(), DecodeError>;
}

struct PipelineNode {
    middleware: Arc<dyn Middleware>,
    next: Next,
}

/// The remainder of the chain after the current stage.
///
/// Cheap to clone; a spawned task can own one.
#[derive(Clone, Default)]
pub struct Next {
    node: Option<Arc<PipelineNode>>,
}

impl Next {
    /// Run the rest of the chain. The end of the chain is a no-op.
    ///
    /// # Errors
    /// - `Cancelled` if the context's token fired before the stage started
    pub async fn run(&self, ctx: &mut DecodeContext) -> Result<(), DecodeError> {
        let Some(node) = &self.node else {
            return Ok(());
        };
        if ctx.cancellation.is_cancelled() {
            return Err(DecodeError::Cancelled);
        }
        node.middleware.invoke(ctx, &node.next).await
    }

    pub fn is_end(&self) -> bool {
        self.node.is_none()
    }
}

/// A built chain of stages.
#[derive(Clone)]
pub struct Pipeline {
    head: Next,
    names: Vec<&'static str>,
}

impl Pipeline {
    /// Link `stages` so that stage *i* continues into stage *i + 1*.
    pub fn build(stages: Vec<Arc<dyn Middleware>>) -> Self {
        let names = stages.iter().map(|s| s.name()).collect();
        let mut head = Next::default();
        for middleware in stages.into_iter().rev() {
            head = Next {
                node: Some(Arc::new(PipelineNode {
                    middleware,
                    next: head,
                })),
            };
        }
        Self { head, names }
    }

    pub async fn invoke(&self, ctx: &mut DecodeContext) -> Result<(), DecodeError> {
        self.head.run(ctx).await
    }

    /// Stage names in execution order.
    pub fn stages(&self) -> &[&'static str] {
        &self.names
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::format::tiff::ByteOrder;
    use crate::geometry::{Point, Size};
    use crate::io::MemoryRangeReader;
    use crate::pixel::{Gray8, ImageBuffer, PixelBufferWriter, PixelConversion, TypedSink};
    use crate::pool::MemoryPool;

    fn context() -> DecodeContext {
        let buffer = Arc::new(ImageBuffer::<Gray8>::new(1, 1));
        let sink = Arc::new(TypedSink::new(buffer as Arc<dyn PixelBufferWriter<Gray8>>));
        DecodeContext::new(
            Arc::new(DecodeParameters {
                byte_order: ByteOrder::LittleEndian,
                reader: Arc::new(MemoryRangeReader::new(vec![0u8; 1], "mem://pipe")),
                memory_pool: MemoryPool::unpooled(),
                pixel_conversion: PixelConversion::Canonical,
            }),
            CancellationToken::new(),
            Size::new(1, 1),
            Point::new(0, 0),
            Size::new(1, 1),
            Arc::new(Destination::Sink(sink)),
        )
    }

    struct Record {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        repeat: usize,
    }

    #[async_trait]
    impl Middleware for Record {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn invoke(&self, ctx: &mut DecodeContext, next: &Next) -> Result<(), DecodeError> {
            for _ in 0..self.repeat {
                self.log.lock().unwrap().push(format!("{}:pre", self.name));
                next.run(ctx).await?;
                self.log.lock().unwrap().push(format!("{}:post", self.name));
            }
            Ok(())
        }
    }

    struct Fail;

    #[async_trait]
    impl Middleware for Fail {
        fn name(&self) -> &'static str {
            "fail"
        }

        async fn invoke(&self, _ctx: &mut DecodeContext, _next: &Next) -> Result<(), DecodeError> {
            Err(DecodeError::UnsupportedPredictor(9))
        }
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stage = |name, repeat| -> Arc<dyn Middleware> {
            Arc::new(Record {
                name,
                log: log.clone(),
                repeat,
            })
        };
        let pipeline = Pipeline::build(vec![stage("a", 1), stage("b", 2)]);
        assert_eq!(pipeline.stages(), &["a", "b"]);

        pipeline.invoke(&mut context()).await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:pre", "b:pre", "b:post", "b:pre", "b:post", "a:post"]
        );
    }

    #[tokio::test]
    async fn test_error_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::build(vec![
            Arc::new(Record {
                name: "a",
                log: log.clone(),
                repeat: 1,
            }),
            Arc::new(Fail),
        ]);
        let err = pipeline.invoke(&mut context()).await.unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedPredictor(9)));
        assert_eq!(*log.lock().unwrap(), vec!["a:pre"]);
    }

    #[tokio::test]
    async fn test_cancellation_checked_per_node() {
        let pipeline = Pipeline::build(vec![Arc::new(Fail)]);
        let mut ctx = context();
        ctx.cancellation.cancel();
        let err = pipeline.invoke(&mut ctx).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_empty_pipeline_is_noop() {
        let pipeline = Pipeline::build(Vec::new());
        assert!(pipeline.stages().is_empty());
        pipeline.invoke(&mut context()).await.unwrap();
    }
}
