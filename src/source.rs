//! Frames and the sources that produce them.
//!
//! A [`Frame`] is one unit of annotation work: an image file picked by the
//! user, or one raster pulled from a [`VideoSource`]. Frames carry their pixel
//! size so geometry can be normalized without decoding the image.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::atomic::write_atomic;
use crate::error::FramelabelError;

/// Extensions treated as images when scanning folders.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "png", "jpeg", "bmp", "webp"];

/// One image to annotate.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Source file, for frames that came from disk.
    pub path: Option<PathBuf>,
    /// Encoded image bytes, for frames pulled from a stream.
    pub bytes: Option<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    /// Index in the batch or position in the stream.
    pub position: u64,
}

impl Frame {
    /// A frame backed by an image file; the size is read from its header.
    pub fn from_path(path: impl Into<PathBuf>, position: u64) -> Result<Self, FramelabelError> {
        let path = path.into();
        let (width, height) = read_image_dimensions(&path)?;
        Ok(Self {
            path: Some(path),
            bytes: None,
            width,
            height,
            position,
        })
    }

    /// A frame backed by encoded bytes, such as one pulled from a stream.
    pub fn from_bytes(bytes: Vec<u8>, position: u64) -> Result<Self, FramelabelError> {
        let size =
            imagesize::blob_size(&bytes).map_err(|source| FramelabelError::ImageDimensionRead {
                path: PathBuf::from(format!("<frame {position}>")),
                source,
            })?;
        let (width, height) = size_to_u32(size, Path::new("<frame>"))?;
        Ok(Self {
            path: None,
            bytes: Some(bytes),
            width,
            height,
            position,
        })
    }

    /// File name used when the frame is written into a dataset or snapshot.
    ///
    /// File frames keep their original name; stream frames are named after
    /// their position.
    pub fn file_name(&self) -> String {
        if let Some(name) = self
            .path
            .as_ref()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
        {
            return name.to_string();
        }
        format!("frame_{:06}.{}", self.position, self.extension())
    }

    /// Stem of [`Frame::file_name`]; names the label file.
    pub fn stem(&self) -> String {
        let name = self.file_name();
        Path::new(&name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&name)
            .to_string()
    }

    /// Best-effort extension: from the path, else sniffed from the bytes.
    pub fn extension(&self) -> &'static str {
        if let Some(ext) = self
            .path
            .as_ref()
            .and_then(|p| p.extension())
            .and_then(|e| e.to_str())
        {
            return IMAGE_EXTENSIONS
                .iter()
                .copied()
                .find(|known| ext.eq_ignore_ascii_case(known))
                .unwrap_or("img");
        }
        match self.bytes.as_deref().map(imagesize::image_type) {
            Some(Ok(imagesize::ImageType::Jpeg)) => "jpg",
            Some(Ok(imagesize::ImageType::Png)) => "png",
            Some(Ok(imagesize::ImageType::Bmp)) => "bmp",
            Some(Ok(imagesize::ImageType::Webp)) => "webp",
            _ => "img",
        }
    }

    /// Loads the encoded image, from memory or from disk.
    pub fn read_bytes(&self) -> Result<Vec<u8>, FramelabelError> {
        match (&self.bytes, &self.path) {
            (Some(bytes), _) => Ok(bytes.clone()),
            (None, Some(path)) => {
                fs::read(path).map_err(|source| FramelabelError::persistence(path, source))
            }
            (None, None) => Err(FramelabelError::NoFrameLoaded),
        }
    }
}

/// A producer of consecutive frames, such as a decoded video or camera.
///
/// `Ok(None)` marks the end of the stream; it is not an error.
pub trait VideoSource: Send {
    fn next_frame(&mut self) -> Result<Option<Frame>, FramelabelError>;

    /// Number of frames produced so far.
    fn position(&self) -> u64;
}

/// Plays back a list of image files as a stream.
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    position: u64,
}

impl ImageSequenceSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths, position: 0 }
    }

    /// All images directly inside `dir`, in file-name order.
    pub fn from_dir(dir: &Path) -> Result<Self, FramelabelError> {
        let paths = collect_image_files(dir)?;
        if paths.is_empty() {
            return Err(FramelabelError::EmptyFolder {
                path: dir.to_path_buf(),
            });
        }
        Ok(Self::new(paths))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl VideoSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FramelabelError> {
        let Some(path) = self.paths.get(self.position as usize).cloned() else {
            return Ok(None);
        };
        let position = self.position;
        // Advance first so an unreadable file is skipped on the next pull.
        self.position += 1;

        let bytes = fs::read(&path).map_err(|source| FramelabelError::persistence(&path, source))?;
        let mut frame = Frame::from_bytes(bytes, position)?;
        frame.path = Some(path);
        Ok(Some(frame))
    }

    fn position(&self) -> u64 {
        self.position
    }
}

/// Writes every `every_n`-th frame of `source` into `out_dir` as
/// `frame_000000.<ext>`, `frame_000001.<ext>`, ... and returns the paths.
///
/// `every_n` of zero is treated as one.
pub fn extract_frames(
    source: &mut dyn VideoSource,
    out_dir: &Path,
    every_n: u64,
) -> Result<Vec<PathBuf>, FramelabelError> {
    let every_n = every_n.max(1);
    fs::create_dir_all(out_dir).map_err(|source| FramelabelError::persistence(out_dir, source))?;

    let mut written = Vec::new();
    let mut frame_id: u64 = 0;
    while let Some(frame) = source.next_frame()? {
        if frame_id % every_n == 0 {
            let name = format!("frame_{:06}.{}", written.len(), frame.extension());
            let path = out_dir.join(name);
            write_atomic(&path, &frame.read_bytes()?)?;
            written.push(path);
        }
        frame_id += 1;
    }

    tracing::info!(
        frames_read = frame_id,
        frames_written = written.len(),
        dir = %out_dir.display(),
        "frame extraction finished"
    );
    Ok(written)
}

/// Image files directly inside `dir`, sorted by file name.
pub fn collect_image_files(dir: &Path) -> Result<Vec<PathBuf>, FramelabelError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry = entry.map_err(|err| {
            let source = err
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory traversal failed"));
            FramelabelError::persistence(dir, source)
        })?;

        if entry.file_type().is_file() && has_extension(entry.path(), &IMAGE_EXTENSIONS) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

pub(crate) fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}

fn read_image_dimensions(path: &Path) -> Result<(u32, u32), FramelabelError> {
    let size = imagesize::size(path).map_err(|source| FramelabelError::ImageDimensionRead {
        path: path.to_path_buf(),
        source,
    })?;
    size_to_u32(size, path)
}

fn size_to_u32(size: imagesize::ImageSize, path: &Path) -> Result<(u32, u32), FramelabelError> {
    let width: u32 = size.width.try_into().map_err(|_| {
        FramelabelError::InvalidGeometry(format!(
            "image width {} of {} does not fit in u32",
            size.width,
            path.display()
        ))
    })?;
    let height: u32 = size.height.try_into().map_err(|_| {
        FramelabelError::InvalidGeometry(format!(
            "image height {} of {} does not fit in u32",
            size.height,
            path.display()
        ))
    })?;
    Ok((width, height))
}
