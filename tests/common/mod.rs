#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use framelabel::detect::{DetectionSource, Prediction};
use framelabel::pipeline::CancelToken;
use framelabel::source::Frame;
use framelabel::FramelabelError;

pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    let row_stride = (width * 3).div_ceil(4) * 4;
    let pixel_array_size = row_stride * height;
    let file_size = 54 + pixel_array_size;

    let mut bytes = Vec::with_capacity(file_size as usize);
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&file_size.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&54u32.to_le_bytes());

    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&(width as i32).to_le_bytes());
    bytes.extend_from_slice(&(height as i32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&24u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&pixel_array_size.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    bytes.resize(file_size as usize, 0);
    bytes
}

pub fn write_bmp(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, bmp_bytes(width, height)).expect("write bmp file");
}

/// Writes `names` as `width` x `height` BMP frames into `dir`.
pub fn write_frames(dir: &Path, names: &[&str], width: u32, height: u32) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            write_bmp(&path, width, height);
            path
        })
        .collect()
}

pub fn write_sidecar(dir: &Path, stem: &str, json: &str) {
    fs::create_dir_all(dir).expect("create predictions dir");
    fs::write(dir.join(format!("{stem}.json")), json).expect("write sidecar");
}

pub fn label_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .expect("read label file")
        .lines()
        .map(str::to_string)
        .collect()
}

/// Detector that returns the same boxes for every frame, failing for frames
/// whose stem is in `fail_stems`, and optionally cancelling a token after
/// `cancel_after` calls.
pub struct ScriptedDetector {
    pub predictions: Vec<Prediction>,
    pub fail_stems: Vec<String>,
    pub cancel_after: Option<(usize, CancelToken)>,
    pub calls: usize,
}

impl ScriptedDetector {
    pub fn new(predictions: Vec<Prediction>) -> Self {
        Self {
            predictions,
            fail_stems: Vec::new(),
            cancel_after: None,
            calls: 0,
        }
    }

    pub fn failing_on(mut self, stem: &str) -> Self {
        self.fail_stems.push(stem.to_string());
        self
    }

    pub fn cancelling_after(mut self, calls: usize, token: CancelToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }
}

impl DetectionSource for ScriptedDetector {
    fn predict(&mut self, frame: &Frame, _confidence: f32) -> Result<Vec<Prediction>, FramelabelError> {
        self.calls += 1;
        if let Some((after, token)) = &self.cancel_after {
            if self.calls >= *after {
                token.cancel();
            }
        }
        if self.fail_stems.contains(&frame.stem()) {
            return Err(FramelabelError::Detection(format!(
                "model crashed on {}",
                frame.stem()
            )));
        }
        Ok(self.predictions.clone())
    }
}
