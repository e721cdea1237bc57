//! Filesystem helpers shared by the strategies

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

static TMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Create a directory and its parents; no-op when it already exists
pub fn create_folder(path: &Path) -> io::Result<()> {
    if !path.is_dir() {
        debug!("Creating folder {:?}", path);
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Remove a file or directory tree; a missing path is not an error
pub fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Whether a directory exists and has no entries
pub fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

/// Stream `reader` into `dest`, replacing it only once the copy completed
pub fn write_stream<R: Read>(dest: &Path, reader: &mut R) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        create_folder(parent).with_context(|| format!("Failed to create {:?}", parent))?;
    }

    let partial = partial_path(dest);
    let written = (|| -> io::Result<u64> {
        let mut file = File::create(&partial)?;
        let written = io::copy(reader, &mut file)?;
        file.flush()?;
        Ok(written)
    })();

    match written {
        Ok(written) => {
            fs::rename(&partial, dest)
                .with_context(|| format!("Failed to move download into {:?}", dest))?;
            Ok(written)
        }
        Err(err) => {
            let _ = fs::remove_file(&partial);
            Err(err).with_context(|| format!("Failed to write {:?}", dest))
        }
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Hex MD5 digest of a file
pub fn md5_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut context = md5::Context::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }

    Ok(format!("{:x}", context.compute()))
}

/// Zip the contents of `source` into `dest`, paths relative to `source`
///
/// The archive is built next to `dest` and only moved over it once complete.
pub fn zip_dir(source: &Path, dest: &Path) -> Result<()> {
    let partial = partial_path(dest);

    match write_zip(source, &partial) {
        Ok(()) => {
            fs::rename(&partial, dest)
                .with_context(|| format!("Failed to move archive into {:?}", dest))?;
            debug!("Archived {:?} into {:?}", source, dest);
            Ok(())
        }
        Err(err) => {
            let _ = fs::remove_file(&partial);
            Err(err)
        }
    }
}

fn write_zip(source: &Path, dest: &Path) -> Result<()> {
    let file = File::create(dest).with_context(|| format!("Failed to create {:?}", dest))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry.context("Failed to walk archive source")?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .context("Archive entry outside of source")?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{}/", name), options)?;
        } else {
            zip.start_file(name, options)?;
            let mut input = File::open(entry.path())
                .with_context(|| format!("Failed to open {:?}", entry.path()))?;
            io::copy(&mut input, &mut zip)?;
        }
    }

    zip.finish().context("Failed to finish archive")?;
    Ok(())
}

/// Create a fresh, uniquely named folder below `tmp_root`
pub fn create_tmp_folder(tmp_root: &Path) -> io::Result<PathBuf> {
    loop {
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let candidate = tmp_root.join(format!("{}-{}", std::process::id(), n));
        if !candidate.exists() {
            fs::create_dir_all(&candidate)?;
            return Ok(candidate);
        }
    }
}

/// Replace characters that cannot appear in a single path component
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\0' { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}
