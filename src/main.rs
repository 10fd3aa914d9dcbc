#![recursion_limit = "256"]

use cifar_cnn::logger::{install_logger, LOG_FILE};

#[cfg(any(feature = "ndarray", feature = "ndarray-blas-openblas"))]
mod ndarray {
    use burn::backend::{
        ndarray::{NdArray, NdArrayDevice},
        Autodiff,
    };

    pub fn run() -> cifar_cnn::Result<()> {
        cifar_cnn::experiment::run::<Autodiff<NdArray>>(NdArrayDevice::Cpu)
    }
}

#[cfg(feature = "tch-cpu")]
mod tch_cpu {
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };

    pub fn run() -> cifar_cnn::Result<()> {
        cifar_cnn::experiment::run::<Autodiff<LibTorch>>(LibTorchDevice::Cpu)
    }
}

#[cfg(feature = "tch-gpu")]
mod tch_gpu {
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };

    pub fn run() -> cifar_cnn::Result<()> {
        #[cfg(not(target_os = "macos"))]
        let device = LibTorchDevice::Cuda(0);
        #[cfg(target_os = "macos")]
        let device = LibTorchDevice::Mps;

        cifar_cnn::experiment::run::<Autodiff<LibTorch>>(device)
    }
}

#[cfg(feature = "wgpu")]
mod wgpu {
    use burn::backend::{
        wgpu::{Wgpu, WgpuDevice},
        Autodiff,
    };

    pub fn run() -> cifar_cnn::Result<()> {
        cifar_cnn::experiment::run::<Autodiff<Wgpu>>(WgpuDevice::default())
    }
}

#[allow(unreachable_code)]
fn launch() -> cifar_cnn::Result<()> {
    #[cfg(feature = "tch-gpu")]
    return tch_gpu::run();

    #[cfg(feature = "tch-cpu")]
    return tch_cpu::run();

    #[cfg(feature = "wgpu")]
    return wgpu::run();

    #[cfg(any(feature = "ndarray", feature = "ndarray-blas-openblas"))]
    return ndarray::run();

    unreachable!("At least one backend will be selected.")
}

fn main() {
    install_logger(LOG_FILE);

    if let Err(err) = launch() {
        log::error!("{err}");
        std::process::exit(1);
    }
}
