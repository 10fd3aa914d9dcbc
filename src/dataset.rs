use std::fmt;
use std::fs::{self, create_dir_all};
use std::io;
use std::path::{Path, PathBuf};

use burn::data::dataset::{Dataset, InMemDataset};
use burn_common::network::downloader::download_file_as_bytes;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tar::Archive;

use crate::{Error, Result};

// Binary distribution from the dataset authors.
const URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz";
const ARCHIVE_NAME: &str = "cifar-10-binary.tar.gz";
const BATCHES_DIR: &str = "cifar-10-batches-bin";
const TRAIN_FILES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
const TEST_FILES: [&str; 1] = ["test_batch.bin"];

pub const WIDTH: usize = 32;
pub const HEIGHT: usize = 32;
pub const CHANNELS: usize = 3;
pub const NUM_CLASSES: usize = 10;

/// Number of bytes of one image, channel-planar (all red, then green, then blue).
pub const IMAGE_BYTES: usize = CHANNELS * WIDTH * HEIGHT;

// One label byte followed by the image.
const RECORD_BYTES: usize = IMAGE_BYTES + 1;

/// The ten CIFAR-10 classes, in label order.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CifarClass {
    Plane,
    Car,
    Bird,
    Cat,
    Deer,
    Dog,
    Frog,
    Horse,
    Ship,
    Truck,
}

impl CifarClass {
    /// Every class, ordered by label.
    pub const ALL: [CifarClass; NUM_CLASSES] = [
        CifarClass::Plane,
        CifarClass::Car,
        CifarClass::Bird,
        CifarClass::Cat,
        CifarClass::Deer,
        CifarClass::Dog,
        CifarClass::Frog,
        CifarClass::Horse,
        CifarClass::Ship,
        CifarClass::Truck,
    ];

    /// Label of the class.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Class for a label, `None` when the label is out of range.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            CifarClass::Plane => "plane",
            CifarClass::Car => "car",
            CifarClass::Bird => "bird",
            CifarClass::Cat => "cat",
            CifarClass::Deer => "deer",
            CifarClass::Dog => "dog",
            CifarClass::Frog => "frog",
            CifarClass::Horse => "horse",
            CifarClass::Ship => "ship",
            CifarClass::Truck => "truck",
        }
    }
}

impl fmt::Display for CifarClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Train or test part of the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CifarSplit {
    Train,
    Test,
}

impl CifarSplit {
    fn files(self) -> &'static [&'static str] {
        match self {
            CifarSplit::Train => &TRAIN_FILES,
            CifarSplit::Test => &TEST_FILES,
        }
    }
}

/// CIFAR-10 item.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CifarItem {
    /// Image as [`IMAGE_BYTES`] channel-planar bytes.
    pub image: Vec<u8>,

    /// Class of the image.
    pub label: CifarClass,
}

/// The CIFAR-10 dataset consists of 60,000 32x32 colour images in 10 classes, with 6,000 images
/// per class. There are 50,000 training images and 10,000 test images.
///
/// The binary distribution is small enough to be kept in memory once decoded: 150Mb for the
/// training split and 30Mb for the test split.
pub struct CifarDataset {
    dataset: InMemDataset<CifarItem>,
}

impl Dataset<CifarItem> for CifarDataset {
    fn get(&self, index: usize) -> Option<CifarItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl CifarDataset {
    /// Creates the train dataset, downloading it on first use.
    pub fn train() -> Result<Self> {
        Self::new(CifarSplit::Train)
    }

    /// Creates the test dataset, downloading it on first use.
    pub fn test() -> Result<Self> {
        Self::new(CifarSplit::Test)
    }

    pub fn new(split: CifarSplit) -> Result<Self> {
        let root = Self::download()?;
        Self::from_dir(root, split)
    }

    /// Reads the split from a directory holding the extracted `*.bin` batch files.
    pub fn from_dir<P: AsRef<Path>>(root: P, split: CifarSplit) -> Result<Self> {
        let mut items = Vec::new();

        for name in split.files() {
            let path = root.as_ref().join(name);
            let bytes = fs::read(&path).map_err(|err| Error::Dataset {
                path: path.clone(),
                reason: err.to_string(),
            })?;
            items.extend(parse_records(&bytes, &path)?);
        }

        log::info!(
            "Loaded {} {:?} samples from {}",
            items.len(),
            split,
            root.as_ref().display()
        );

        Ok(Self::from_items(items))
    }

    pub fn from_items(items: Vec<CifarItem>) -> Self {
        Self {
            dataset: InMemDataset::new(items),
        }
    }

    /// Download and extract the archive into the burn-dataset cache directory, unless every batch
    /// file is already there.
    /// The download itself panics if the remote cannot be reached.
    fn download() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no cache directory"))?
            .join("burn-dataset")
            .join("cifar10");
        let batches_dir = cache_dir.join(BATCHES_DIR);

        let complete = TRAIN_FILES
            .iter()
            .chain(TEST_FILES.iter())
            .all(|name| batches_dir.join(name).exists());

        if !complete {
            create_dir_all(&cache_dir)?;
            log::info!("Downloading CIFAR-10 into {}", cache_dir.display());

            let bytes = download_file_as_bytes(URL, ARCHIVE_NAME);
            let mut archive = Archive::new(GzDecoder::new(&bytes[..]));
            archive.unpack(&cache_dir)?;
        }

        Ok(batches_dir)
    }
}

/// Decode the fixed-size records of one batch file.
fn parse_records(bytes: &[u8], path: &Path) -> Result<Vec<CifarItem>> {
    if bytes.len() % RECORD_BYTES != 0 {
        return Err(Error::Dataset {
            path: path.to_path_buf(),
            reason: format!(
                "size {} is not a multiple of the record size {RECORD_BYTES}",
                bytes.len()
            ),
        });
    }

    bytes
        .chunks_exact(RECORD_BYTES)
        .enumerate()
        .map(|(index, record)| {
            let label = CifarClass::from_index(record[0] as usize).ok_or_else(|| {
                Error::Dataset {
                    path: path.to_path_buf(),
                    reason: format!("record {index} has invalid label {}", record[0]),
                }
            })?;

            Ok(CifarItem {
                image: record[1..].to_vec(),
                label,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(label: u8, pixel: u8) -> Vec<u8> {
        let mut record = vec![label];
        record.extend(std::iter::repeat(pixel).take(IMAGE_BYTES));
        record
    }

    #[test]
    fn class_order_follows_labels() {
        for (index, class) in CifarClass::ALL.iter().enumerate() {
            assert_eq!(class.index(), index);
            assert_eq!(CifarClass::from_index(index), Some(*class));
        }
        assert_eq!(CifarClass::from_index(NUM_CLASSES), None);
        assert_eq!(CifarClass::Plane.name(), "plane");
        assert_eq!(CifarClass::Truck.to_string(), "truck");
        assert_eq!(format!("{:>5}", CifarClass::Car), "  car");
    }

    #[test]
    fn parses_records_in_file_order() {
        let mut bytes = record(3, 10);
        bytes.extend(record(9, 20));

        let items = parse_records(&bytes, Path::new("batch.bin")).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, CifarClass::Cat);
        assert_eq!(items[1].label, CifarClass::Truck);
        assert_eq!(items[0].image.len(), IMAGE_BYTES);
        assert!(items[1].image.iter().all(|pixel| *pixel == 20));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let mut bytes = record(1, 0);
        bytes.pop();

        let result = parse_records(&bytes, Path::new("batch.bin"));

        assert!(matches!(result, Err(Error::Dataset { .. })));
    }

    #[test]
    fn unknown_label_is_rejected() {
        let result = parse_records(&record(10, 0), Path::new("batch.bin"));

        assert!(matches!(result, Err(Error::Dataset { .. })));
    }

    #[test]
    fn reads_split_files_from_directory() {
        let dir = TempDir::new().unwrap();
        for (index, name) in TRAIN_FILES.iter().enumerate() {
            fs::write(dir.path().join(name), record(index as u8, index as u8)).unwrap();
        }
        fs::write(dir.path().join(TEST_FILES[0]), record(7, 0)).unwrap();

        let train = CifarDataset::from_dir(dir.path(), CifarSplit::Train).unwrap();
        let test = CifarDataset::from_dir(dir.path(), CifarSplit::Test).unwrap();

        assert_eq!(train.len(), TRAIN_FILES.len());
        assert_eq!(test.len(), 1);
        let labels: Vec<_> = train.iter().map(|item| item.label.index()).collect();
        assert_eq!(labels, vec![0, 1, 2, 3, 4]);
        assert_eq!(test.get(0).unwrap().label, CifarClass::Horse);
    }

    #[test]
    fn missing_split_file_is_fatal() {
        let dir = TempDir::new().unwrap();

        let result = CifarDataset::from_dir(dir.path(), CifarSplit::Test);

        assert!(matches!(result, Err(Error::Dataset { .. })));
    }
}
