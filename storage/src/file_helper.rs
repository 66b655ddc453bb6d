use crate::consts::TMP_FILE_INFIX;
use log::warn;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::{fs, io, time};

/// Helper struct that provides utility functions for managing durable files
/// and their temporary counterparts.
///
/// Every file is replaced as a whole: new content goes to a temporary file `{file_name}.tmp-{epoch}`
/// placed next to it, and only after it was synced to disk it is renamed over the original.
/// This way the original file always holds either its previous or its new complete content.
pub struct FileHelper;

impl FileHelper {
    /// Removes all temporary files from the file system.
    /// Can fail if io error occurs.
    pub fn remove_tmp_files<Err>(tmp_files: &mut Vec<PathBuf>) -> Result<(), Err>
    where
        Err: From<io::Error>,
    {
        for tmp_path in tmp_files.drain(..) {
            warn!("removing stale temporary file {}", tmp_path.display());
            fs::remove_file(tmp_path)?;
        }
        Ok(())
    }

    /// Returns the latest version of `file_path` content saved on disk or `None` if there is no such file.
    ///
    /// Most of the time it will just return content of the main file,
    /// but in cases when there was a crash during a write operation and new content
    /// was only saved to a temporary file, it will return the content from the newest temporary file
    /// (and the temporary file replaces the main one).
    ///
    /// The function uses a provided `load_fn` to deserialize the content from the file.
    ///
    /// Can fail if io error occurs or file was not properly formatted.
    pub fn latest_version<T, Err>(
        file_path: impl AsRef<Path>,
        load_fn: impl Fn(&Path) -> Result<T, Err>,
    ) -> Result<Option<T>, Err>
    where
        Err: From<io::Error>,
    {
        let file_path = file_path.as_ref();
        let tmp_file_prefix = format!("{}{}", Self::file_name(file_path), TMP_FILE_INFIX);
        let mut tmp_files = Self::list_tmp_files(Self::directory(file_path), &tmp_file_prefix)?;

        let from_tmp = Self::find_latest_valid_tmp::<T, Err>(file_path, &mut tmp_files, &load_fn)?;

        Self::remove_tmp_files(&mut tmp_files)?;

        match from_tmp {
            Some(content) => Ok(Some(content)),
            None if file_path.try_exists()? => Ok(Some(load_fn(file_path)?)),
            None => Ok(None),
        }
    }

    /// Returns a list of all temporary files in the directory at `directory_path` with the given `file_prefix`,
    /// sorted by their epoch timestamp (the latest is the last).
    ///
    /// Temporary files are expected to follow the naming pattern: `{file_prefix}{epoch}`,
    /// where `{epoch}` is a timestamp in milliseconds since UNIX_EPOCH.
    ///
    /// Can fail if io error occurs.
    pub fn list_tmp_files<Err>(
        directory_path: impl AsRef<Path>,
        file_prefix: &str,
    ) -> Result<Vec<PathBuf>, Err>
    where
        Err: From<io::Error>,
    {
        let mut tmp_files = fs::read_dir(directory_path)?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let path = entry.path();
                let file_name = path.file_name()?.to_string_lossy();
                if file_name.starts_with(file_prefix)
                    && let Ok(epoch) = file_name[file_prefix.len()..].parse::<u128>()
                {
                    return Some((epoch, path));
                }
                None
            })
            .collect::<Vec<(u128, PathBuf)>>();

        tmp_files.sort_by_key(|(epoch, _)| *epoch);

        Ok(tmp_files.into_iter().map(|(_, p)| p).collect())
    }

    /// Iterates over elements in `tmp_files` (sorted by epoch, latest last) and tries to find one that has:
    ///
    /// - modification time > main file modification time
    /// - valid content (validated by `load_fn`)
    ///
    /// If successfully found a tmp file that matches these requirements, returns `Some(T)` - the content loaded from that tmp file.
    /// The valid tmp file is then renamed to replace the main file.
    ///
    /// If no such tmp file was found, returns `None`, meaning that content should be loaded from the main file.
    ///
    /// Each element consumed from `tmp_files` is guaranteed to be either:
    /// - Renamed to replace the main file (if valid and newer)
    /// - Removed from the file system (if invalid or older than main file)
    ///
    /// Can fail if io error occurs.
    pub fn find_latest_valid_tmp<T, Err>(
        main_file: impl AsRef<Path>,
        tmp_files: &mut Vec<PathBuf>,
        load_fn: &impl Fn(&Path) -> Result<T, Err>,
    ) -> Result<Option<T>, Err>
    where
        Err: From<io::Error>,
    {
        let main_mtime = Self::file_last_modified_time(&main_file);

        while let Some(tmp_path) = tmp_files.pop() {
            let tmp_mtime = Self::file_last_modified_time(&tmp_path);
            if tmp_mtime <= main_mtime {
                // Main file is the latest one, so every remaining tmp file is stale.
                fs::remove_file(&tmp_path)?;
                break;
            }

            // A torn write never deserializes, so anything that does is a complete newer version.
            if let Ok(content) = load_fn(&tmp_path) {
                warn!(
                    "recovering {} from temporary file {}",
                    main_file.as_ref().display(),
                    tmp_path.display()
                );
                fs::rename(&tmp_path, &main_file)?;
                return Ok(Some(content));
            }
            warn!("removing corrupted temporary file {}", tmp_path.display());
            fs::remove_file(&tmp_path)?;
        }

        Ok(None)
    }

    /// Writes `content` to a tmp file next to `file_path` but does not rename it.
    /// Returns the tmp path.
    ///
    /// If writing fails the tmp file is removed, so a failed write never leaves anything
    /// that could be recovered later.
    pub fn write_tmp(file_path: impl AsRef<Path>, content: &[u8]) -> io::Result<PathBuf> {
        let file_path = file_path.as_ref();
        let epoch = time::SystemTime::now()
            .duration_since(time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();

        let tmp_path = file_path.with_file_name(format!(
            "{}{}{}",
            Self::file_name(file_path),
            TMP_FILE_INFIX,
            epoch
        ));

        let write_result = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .and_then(|mut tmp_file| {
                tmp_file.write_all(content)?;
                // Syncing surfaces every deferred write error before the file is closed.
                tmp_file.sync_all()
            });

        match write_result {
            Ok(()) => Ok(tmp_path),
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                Err(e)
            }
        }
    }

    /// Atomically replaces `file_path` with `tmp_path`.
    /// On failure `tmp_path` is removed and `file_path` is left untouched.
    pub fn commit_tmp(tmp_path: impl AsRef<Path>, file_path: impl AsRef<Path>) -> io::Result<()> {
        if let Err(e) = fs::rename(&tmp_path, &file_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        Self::sync_directory(Self::directory(file_path.as_ref()))
    }

    /// Safely replaces content of `file_path` with `content`.
    ///
    /// The process:
    /// 1. Create a temporary file with name `{file_path}.tmp-{epoch}`
    /// 2. Write `content` to temporary file
    /// 3. Sync data to disk
    /// 4. Atomically rename temporary file to replace the main file
    ///
    /// If any step fails, the main file remains unchanged.
    pub fn write_atomic(file_path: impl AsRef<Path>, content: &[u8]) -> io::Result<()> {
        let tmp_path = Self::write_tmp(&file_path, content)?;
        Self::commit_tmp(&tmp_path, &file_path)
    }

    /// Serializes `data` using the provided `serialize_fn` and safely writes it to `file_path`
    /// (see [`FileHelper::write_atomic`]).
    ///
    /// Serialization happens before any file is touched, so its failure leaves the file system unchanged.
    ///
    /// Can fail if io error occurs or serialization fails.
    pub fn sync_to_disk<T, TErr>(
        file_path: impl AsRef<Path>,
        data: &T,
        serialize_fn: impl Fn(&T) -> Result<String, TErr>,
    ) -> Result<(), TErr>
    where
        TErr: From<io::Error>,
    {
        let content = serialize_fn(data)?;
        Self::write_atomic(file_path, content.as_bytes())?;
        Ok(())
    }

    /// Returns time of last file modification.
    /// For convenience in case of error just returns UNIX_EPOCH.
    fn file_last_modified_time(path: impl AsRef<Path>) -> time::SystemTime {
        let meta = fs::metadata(path);
        meta.and_then(|m| m.modified()).unwrap_or(time::UNIX_EPOCH)
    }

    fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn directory(path: &Path) -> &Path {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Makes the rename itself durable.
    #[cfg(unix)]
    fn sync_directory(directory: &Path) -> io::Result<()> {
        fs::File::open(directory)?.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_directory(_directory: &Path) -> io::Result<()> {
        Ok(())
    }
}
