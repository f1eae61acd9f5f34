//! Time-free stream acquisition for radrec
//!
//! A [`StreamWindow`] and a station become a [`StreamDescriptor`]; the
//! descriptor is handed to ffmpeg by [`StreamAcquisition`].

pub mod acquisition;
pub mod progress;
pub mod request;
pub mod window;

pub use acquisition::{
    CancelHandle, ProgressCallback, StreamAcquisition, StreamProgress, Transfer, TransferError,
    TransferOutcome, TransferState,
};
pub use progress::{estimate_progress, ProgressEstimator};
pub use request::{
    output_path, validate_station_id, RequestError, StreamDescriptor, StreamRequestBuilder,
    TrackingValue,
};
pub use window::{StreamWindow, WindowError};
