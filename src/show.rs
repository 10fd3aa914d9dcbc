use std::fs;
use std::path::Path;

use burn::prelude::*;
use image::{Rgb, RgbImage};

use crate::dataset::{CHANNELS, HEIGHT, WIDTH};
use crate::{Error, Result};

/// Pixels between and around the images of a grid.
const PADDING: u32 = 2;
/// Images per grid row.
const PER_ROW: usize = 8;

/// Save a batch of normalized images `[batch_size, 3, 32, 32]` as a single PNG grid.
///
/// Images are mapped back from [-1, 1] to [0, 255] and laid out left to right, at most
/// eight per row, on a black background.
pub fn save_image_grid<B: Backend, P: AsRef<Path>>(
    images: &Tensor<B, 4>,
    path: P,
) -> Result<()> {
    let path = path.as_ref();

    // Ensure the output directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let [batch_size, channels, height, width] = images.dims();
    debug_assert_eq!([channels, height, width], [CHANNELS, HEIGHT, WIDTH]);

    let pixels = unnormalize(images.clone())
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| Error::TensorData(format!("{err:?}")))?;

    let grid = grid(&pixels, batch_size, height as u32, width as u32);
    grid.save(path)?;

    log::info!("Saved {batch_size} images to {}", path.display());
    Ok(())
}

/// Map values from [-1, 1] to [0, 255].
fn unnormalize<B: Backend>(images: Tensor<B, 4>) -> Tensor<B, 4> {
    images
        .div_scalar(2.0)
        .add_scalar(0.5)
        .clamp(0.0, 1.0)
        .mul_scalar(255.0)
}

/// Lay out channel-planar images in rows of at most [`PER_ROW`].
fn grid(pixels: &[f32], count: usize, height: u32, width: u32) -> RgbImage {
    let columns = count.clamp(1, PER_ROW) as u32;
    let rows = count.div_ceil(PER_ROW).max(1) as u32;
    let plane = (height * width) as usize;

    let mut grid = RgbImage::new(
        columns * (width + PADDING) + PADDING,
        rows * (height + PADDING) + PADDING,
    );

    for index in 0..count {
        let image = &pixels[index * CHANNELS * plane..(index + 1) * CHANNELS * plane];
        let left = PADDING + (index as u32 % columns) * (width + PADDING);
        let top = PADDING + (index as u32 / columns) * (height + PADDING);

        for y in 0..height {
            for x in 0..width {
                let offset = (y * width + x) as usize;
                let channel = |c: usize| image[c * plane + offset] as u8;
                grid.put_pixel(left + x, top + y, Rgb([channel(0), channel(1), channel(2)]));
            }
        }
    }

    grid
}
