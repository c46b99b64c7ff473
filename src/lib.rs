pub mod errors;
pub mod corpus;
pub mod dataset;
pub mod model;
pub mod sampler;
pub mod transcript;
pub mod train;
pub mod plot;
pub mod sweep;

pub use errors::{LyricError, Result};
pub use corpus::{clean_text, load_lyrics_csv, load_lyrics_dir};
pub use dataset::{build_windows, CharVocab, WindowBatch, WindowBatcher, WindowBatches, WindowItem, WindowSet};
pub use model::{CellKind, RecurrentLm, RecurrentLmConfig};
pub use sampler::{generate_text, sample_index, temperature_distribution};
pub use transcript::{EpochHook, NoHook, SampleTranscript, SAMPLE_TEMPERATURES};
pub use train::{train_model, EpochLosses, LossHistory, Trainer, TrainingConfig};
pub use plot::{plot_losses, LossSplit};
pub use sweep::{run_sweep, OutputLayout, SweepConfig};

pub use burn::{
    module::Module,
    config::Config,
    record::{BinFileRecorder, FullPrecisionSettings, Recorder},
};

#[cfg(feature = "wgpu")]
pub use burn::backend::wgpu::{Wgpu, WgpuDevice};

#[cfg(feature = "candle")]
pub use burn::backend::candle::{Candle, CandleDevice};

#[cfg(feature = "tch")]
pub use burn::backend::libtorch::{LibTorch, LibTorchDevice};

#[cfg(feature = "ndarray")]
pub use burn::backend::ndarray::{NdArray, NdArrayDevice};

#[cfg(feature = "autodiff")]
pub use burn::backend::autodiff::Autodiff;

// Exactly one backend is active, picked by priority: wgpu > candle > tch > ndarray

// WGPU backend (highest priority)
#[cfg(feature = "wgpu")]
pub type RawBackend = Wgpu<f32, i32>;
#[cfg(feature = "wgpu")]
pub type BackendDevice = WgpuDevice;

// Candle backend
#[cfg(all(feature = "candle", not(feature = "wgpu")))]
pub type RawBackend = Candle<f32>;
#[cfg(all(feature = "candle", not(feature = "wgpu")))]
pub type BackendDevice = CandleDevice;

// LibTorch backend
#[cfg(all(feature = "tch", not(any(feature = "wgpu", feature = "candle"))))]
pub type RawBackend = LibTorch<f32>;
#[cfg(all(feature = "tch", not(any(feature = "wgpu", feature = "candle"))))]
pub type BackendDevice = LibTorchDevice;

// NdArray backend (lowest priority)
#[cfg(all(feature = "ndarray", not(any(feature = "wgpu", feature = "candle", feature = "tch"))))]
pub type RawBackend = NdArray<f32>;
#[cfg(all(feature = "ndarray", not(any(feature = "wgpu", feature = "candle", feature = "tch"))))]
pub type BackendDevice = NdArrayDevice;

/// Backend used for training
#[cfg(feature = "autodiff")]
pub type TrainBackend = Autodiff<RawBackend>;

#[cfg(not(any(feature = "wgpu", feature = "candle", feature = "tch", feature = "ndarray")))]
compile_error!("At least one backend feature must be enabled: 'wgpu', 'candle', 'tch', or 'ndarray'");

/// Device of the active backend
pub fn backend_device() -> BackendDevice {
    #[cfg(all(feature = "candle-cuda", not(feature = "wgpu")))]
    {
        CandleDevice::Cuda(0)
    }
    #[cfg(not(all(feature = "candle-cuda", not(feature = "wgpu"))))]
    {
        BackendDevice::default()
    }
}

/// Name of the active backend, for logging
pub fn backend_name() -> &'static str {
    if cfg!(feature = "wgpu") {
        if cfg!(feature = "fusion") { "wgpu-fusion" } else { "wgpu" }
    } else if cfg!(feature = "candle-cuda") {
        "candle-cuda"
    } else if cfg!(feature = "candle") {
        "candle"
    } else if cfg!(feature = "tch") {
        "libtorch"
    } else {
        "ndarray"
    }
}
