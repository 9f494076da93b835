//! Decode pipeline stages.
//!
//! Each stage is a [`Middleware`](crate::pipeline::Middleware) that the
//! decoder factory picks for a directory. In pipeline order:
//!
//! | Stage                     | Runs                                   |
//! |---------------------------|----------------------------------------|
//! | [`ParallelBlocker`]       | once per decode                        |
//! | [`OrientationMapper`]     | once per decode                        |
//! | [`TileEnumerator`] / [`StripEnumerator`] | once per decode         |
//! | [`ParallelDispatcher`]    | once per unit                          |
//! | [`ExclusiveAccess`]       | once per unit                          |
//! | [`DecompressionMiddleware`] | once per unit                        |
//! | [`FillOrderReversal`]     | once per unit, LSB-first data only     |
//! | [`SubsamplingReversal`]   | once per unit, subsampled YCbCr only   |
//! | [`PredictorReversal`]     | once per unit, Predictor 2 only        |
//! | [`PhotometricInterpreter`] | once per unit                         |

mod decompress;
mod enumerator;
mod fill_order;
mod orientation;
pub mod parallel;
mod photometric;
mod predictor;
mod samples;
mod subsampling;

pub use decompress::DecompressionMiddleware;
pub use enumerator::{StripEnumerator, TileEnumerator};
pub use fill_order::FillOrderReversal;
pub use orientation::OrientationMapper;
pub use parallel::{ExclusiveAccess, ParallelBlocker, ParallelDecodingState, ParallelDispatcher};
pub use photometric::{select_interpretation, Alpha, Interpretation, PhotometricInterpreter, YCbCrConverter};
pub use predictor::{undo_horizontal, PredictorReversal};
pub use samples::{max_value, read_bits, write_bits, SampleLayout, SampleView};
pub use subsampling::{expand_chunky, expand_planar, SubsamplingReversal};

// =============================================================================
// Test helpers shared by the stage tests
// =============================================================================
