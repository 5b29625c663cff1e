//! Built-in `file` protocol: the local filesystem

use async_trait::async_trait;
use filetime::FileTime;
use std::io::SeekFrom;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tokio::fs as afs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use url::Url;

use super::{WorkerContext, WorkerProtocol, WorkerResult};
use crate::error::{ErrorCode, JobError};
use crate::logging::*;
use crate::metadata::{RANGE_START, RESUME};
use crate::protocol::codec::STANDARD_BUFFER_SIZE;
use crate::udsentry::{field, file_type, UdsEntry};

/// Suffix of in-progress uploads
pub const PART_SUFFIX: &str = ".part";
/// Failed uploads smaller than this are not kept for resuming
const DEFAULT_MINIMUM_KEEP_SIZE: u64 = 5000;

const MIME_TYPES: &[(&str, &str)] = &[
	("txt", "text/plain"),
	("md", "text/markdown"),
	("html", "text/html"),
	("htm", "text/html"),
	("css", "text/css"),
	("csv", "text/csv"),
	("xml", "application/xml"),
	("json", "application/json"),
	("js", "application/javascript"),
	("rs", "text/rust"),
	("toml", "application/toml"),
	("pdf", "application/pdf"),
	("zip", "application/zip"),
	("gz", "application/gzip"),
	("tar", "application/x-tar"),
	("png", "image/png"),
	("jpg", "image/jpeg"),
	("jpeg", "image/jpeg"),
	("gif", "image/gif"),
	("svg", "image/svg+xml"),
	("mp3", "audio/mpeg"),
	("mp4", "video/mp4"),
];

/// MIME type guessed from the extension
pub fn mime_for_path(path: &Path) -> &'static str {
	path.extension()
		.and_then(|e| e.to_str())
		.map(|e| e.to_ascii_lowercase())
		.and_then(|ext| MIME_TYPES.iter().find(|(e, _)| *e == ext).map(|(_, m)| *m))
		.unwrap_or("application/octet-stream")
}

pub fn part_path(dest: &Path) -> PathBuf {
	let mut name = dest.as_os_str().to_os_string();
	name.push(PART_SUFFIX);
	PathBuf::from(name)
}

fn local_path(url: &Url) -> Result<PathBuf, JobError> {
	url.to_file_path().map_err(|_| JobError::new(ErrorCode::MalformedUrl, url.as_str()))
}

fn io_error(e: std::io::Error, fallback: ErrorCode, path: &Path) -> JobError {
	JobError::from_io(&e, fallback, path.display().to_string())
}

fn exists_error(meta: &std::fs::Metadata, path: &Path) -> JobError {
	let code = if meta.is_dir() { ErrorCode::DirAlreadyExist } else { ErrorCode::FileAlreadyExist };
	JobError::new(code, path.display().to_string())
}

/// Describe `path` without following a final symlink (its target decides type and size)
pub async fn stat_path(path: &Path) -> std::io::Result<UdsEntry> {
	let lmeta = afs::symlink_metadata(path).await?;
	let mut entry = UdsEntry::new();

	let name = path
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_else(|| "/".to_string());
	if name.starts_with('.') {
		entry.insert_num(field::HIDDEN, 1);
	}
	entry.insert_str(field::NAME, name);
	entry.insert_str(field::LOCAL_PATH, path.display().to_string());

	let meta = if lmeta.file_type().is_symlink() {
		let target = afs::read_link(path).await?;
		entry.insert_str(field::LINK_DEST, target.display().to_string());
		// Dangling links are described by the link itself
		afs::metadata(path).await.unwrap_or(lmeta)
	} else {
		lmeta
	};

	entry.insert_num(field::FILE_TYPE, i64::from(meta.mode()) & file_type::MASK);
	entry.insert_num(field::ACCESS, i64::from(meta.mode() & 0o7777));
	entry.insert_num(field::SIZE, meta.len() as i64);
	entry.insert_num(field::MODIFICATION_TIME, meta.mtime());
	entry.insert_num(field::ACCESS_TIME, meta.atime());
	entry.insert_num(field::LOCAL_USER_ID, i64::from(meta.uid()));
	entry.insert_num(field::LOCAL_GROUP_ID, i64::from(meta.gid()));
	entry.insert_num(field::INODE, meta.ino() as i64);
	entry.insert_num(field::DEVICE_ID, meta.dev() as i64);
	if !meta.is_dir() {
		entry.insert_str(field::GUESSED_MIME_TYPE, mime_for_path(path));
	}
	Ok(entry)
}

#[derive(Debug, Default)]
pub struct FileProtocol;

impl FileProtocol {
	pub fn new() -> Self {
		FileProtocol
	}
}

#[async_trait]
impl WorkerProtocol for FileProtocol {
	async fn get(&mut self, ctx: &mut WorkerContext, url: &Url) -> WorkerResult {
		let path = local_path(url)?;
		let meta = afs::metadata(&path)
			.await
			.map_err(|e| io_error(e, ErrorCode::CannotOpenForReading, &path))?;
		if meta.is_dir() {
			return Err(JobError::new(ErrorCode::IsDirectory, path.display().to_string()));
		}
		let mut file = afs::File::open(&path)
			.await
			.map_err(|e| io_error(e, ErrorCode::CannotOpenForReading, &path))?;

		ctx.mime_type(mime_for_path(&path)).await?;
		let size = meta.len();
		ctx.total_size(size).await?;

		let offset = ctx
			.meta_data(RANGE_START)
			.or_else(|| ctx.meta_data(RESUME))
			.and_then(|v| v.trim().parse::<u64>().ok())
			.unwrap_or(0);
		let mut processed = 0u64;
		if offset > 0 {
			if offset > size {
				return Err(JobError::new(ErrorCode::CannotResume, path.display().to_string()));
			}
			file.seek(SeekFrom::Start(offset))
				.await
				.map_err(|e| io_error(e, ErrorCode::CannotSeek, &path))?;
			ctx.can_resume_ack(offset).await?;
			processed = offset;
			debug!("Resuming read of {} at {}", path.display(), offset);
		}

		let mut buf = vec![0u8; STANDARD_BUFFER_SIZE];
		loop {
			if ctx.was_killed() {
				return Err(JobError::canceled());
			}
			let n = file.read(&mut buf).await.map_err(|e| io_error(e, ErrorCode::CannotRead, &path))?;
			if n == 0 {
				break;
			}
			ctx.data(buf[..n].to_vec()).await?;
			processed += n as u64;
			ctx.processed_size(processed).await?;
		}
		ctx.data(Vec::new()).await?;
		ctx.processed_size(processed).await
	}

	async fn put(
		&mut self,
		ctx: &mut WorkerContext,
		url: &Url,
		permissions: Option<u32>,
		overwrite: bool,
		resume: bool,
	) -> WorkerResult {
		let dest = local_path(url)?;
		let mark_partial = ctx.config_bool("MarkPartial", true);
		let part = part_path(&dest);
		let dest_meta = afs::symlink_metadata(&dest).await.ok();

		// Offer whatever a previous attempt left behind
		let mut offset = 0u64;
		let candidate = if mark_partial {
			afs::symlink_metadata(&part).await.ok()
		} else if resume {
			dest_meta.clone()
		} else {
			None
		};
		if let Some(m) = candidate {
			if m.is_file() && m.len() > 0 && !overwrite && ctx.can_resume(m.len()).await? {
				offset = m.len();
			}
		}

		if let Some(m) = &dest_meta {
			if !overwrite && !resume && offset == 0 {
				return Err(exists_error(m, &dest));
			}
		}

		let write_path = if mark_partial { part.clone() } else { dest.clone() };
		let open = if offset > 0 {
			afs::OpenOptions::new().append(true).open(&write_path).await
		} else {
			afs::OpenOptions::new().write(true).create(true).truncate(true).open(&write_path).await
		};
		let mut file = open.map_err(|e| io_error(e, ErrorCode::CannotOpenForWriting, &write_path))?;

		let mut written = offset;
		let result: WorkerResult = async {
			loop {
				let chunk = ctx.data_req().await?;
				if chunk.is_empty() {
					break;
				}
				file.write_all(&chunk).await.map_err(|e| io_error(e, ErrorCode::CannotWrite, &write_path))?;
				written += chunk.len() as u64;
				ctx.processed_size(written).await?;
			}
			file.flush().await.map_err(|e| io_error(e, ErrorCode::CannotWrite, &write_path))?;
			Ok::<(), JobError>(())
		}
		.await;
		drop(file);

		if let Err(err) = result {
			if mark_partial {
				let keep = ctx.config_u64("MinimumKeepSize", DEFAULT_MINIMUM_KEEP_SIZE);
				if let Ok(m) = afs::metadata(&part).await {
					if m.len() < keep {
						debug!("Removing short partial upload {}", part.display());
						let _ = afs::remove_file(&part).await;
					}
				}
			}
			return Err(err);
		}

		if mark_partial {
			if let Some(m) = &dest_meta {
				if m.is_dir() {
					return Err(exists_error(m, &dest));
				}
			}
			afs::rename(&part, &dest)
				.await
				.map_err(|e| io_error(e, ErrorCode::CannotRenamePartial, &part))?;
		}

		if let Some(mode) = permissions {
			afs::set_permissions(&dest, std::fs::Permissions::from_mode(mode))
				.await
				.map_err(|e| io_error(e, ErrorCode::CannotChmod, &dest))?;
		}
		if let Some(mtime) = ctx.meta_data("modified").and_then(|v| v.trim().parse::<i64>().ok()) {
			if let Err(e) = filetime::set_file_mtime(&dest, FileTime::from_unix_time(mtime, 0)) {
				warn!("Cannot set modification time of {}: {}", dest.display(), e);
			}
		}
		Ok(())
	}

	async fn stat(&mut self, ctx: &mut WorkerContext, url: &Url) -> WorkerResult {
		let path = local_path(url)?;
		let entry = stat_path(&path).await.map_err(|e| io_error(e, ErrorCode::CannotStat, &path))?;
		ctx.stat_entry(entry).await
	}

	async fn mimetype(&mut self, ctx: &mut WorkerContext, url: &Url) -> WorkerResult {
		let path = local_path(url)?;
		let meta = afs::metadata(&path).await.map_err(|e| io_error(e, ErrorCode::CannotStat, &path))?;
		let mime = if meta.is_dir() { "inode/directory" } else { mime_for_path(&path) };
		ctx.mime_type(mime).await
	}

	async fn list_dir(&mut self, ctx: &mut WorkerContext, url: &Url) -> WorkerResult {
		let path = local_path(url)?;
		let meta = afs::metadata(&path).await.map_err(|e| io_error(e, ErrorCode::CannotStat, &path))?;
		if !meta.is_dir() {
			return Err(JobError::new(ErrorCode::IsFile, path.display().to_string()));
		}

		let mut dir = afs::read_dir(&path).await.map_err(|e| io_error(e, ErrorCode::CannotRead, &path))?;
		while let Some(child) = dir.next_entry().await.map_err(|e| io_error(e, ErrorCode::CannotRead, &path))? {
			if ctx.was_killed() {
				return Err(JobError::canceled());
			}
			match stat_path(&child.path()).await {
				Ok(entry) => ctx.list_entry(entry).await?,
				// Vanished between readdir and stat
				Err(e) => debug!("Skipping {}: {}", child.path().display(), e),
			}
		}
		Ok(())
	}

	async fn mkdir(&mut self, _ctx: &mut WorkerContext, url: &Url, permissions: Option<u32>) -> WorkerResult {
		let path = local_path(url)?;
		if let Ok(m) = afs::symlink_metadata(&path).await {
			return Err(exists_error(&m, &path));
		}
		afs::create_dir(&path).await.map_err(|e| io_error(e, ErrorCode::CannotMkdir, &path))?;
		if let Some(mode) = permissions {
			afs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
				.await
				.map_err(|e| io_error(e, ErrorCode::CannotChmod, &path))?;
		}
		Ok(())
	}

	async fn rename(&mut self, ctx: &mut WorkerContext, src: &Url, dest: &Url, overwrite: bool) -> WorkerResult {
		let src_path = local_path(src)?;
		let dest_path = local_path(dest)?;
		afs::symlink_metadata(&src_path).await.map_err(|e| io_error(e, ErrorCode::CannotRename, &src_path))?;
		if let Ok(m) = afs::symlink_metadata(&dest_path).await {
			if !overwrite {
				return Err(exists_error(&m, &dest_path));
			}
		}

		match afs::rename(&src_path, &dest_path).await {
			Ok(()) => Ok(()),
			Err(e) if e.raw_os_error() == Some(libc::EXDEV) => Err(JobError::new(
				ErrorCode::UnsupportedAction,
				format!("Renaming or moving files within {} is not supported.", ctx.protocol()),
			)),
			Err(e) => Err(io_error(e, ErrorCode::CannotRename, &src_path)),
		}
	}

	async fn symlink(&mut self, _ctx: &mut WorkerContext, target: &str, dest: &Url, overwrite: bool) -> WorkerResult {
		let dest_path = local_path(dest)?;
		if let Ok(m) = afs::symlink_metadata(&dest_path).await {
			if !overwrite || m.is_dir() {
				return Err(exists_error(&m, &dest_path));
			}
			afs::remove_file(&dest_path).await.map_err(|e| io_error(e, ErrorCode::CannotDelete, &dest_path))?;
		}
		afs::symlink(target, &dest_path).await.map_err(|e| io_error(e, ErrorCode::CannotSymlink, &dest_path))
	}

	async fn chmod(&mut self, _ctx: &mut WorkerContext, url: &Url, permissions: u32) -> WorkerResult {
		let path = local_path(url)?;
		afs::set_permissions(&path, std::fs::Permissions::from_mode(permissions))
			.await
			.map_err(|e| io_error(e, ErrorCode::CannotChmod, &path))
	}

	async fn set_modification_time(&mut self, _ctx: &mut WorkerContext, url: &Url, mtime: i64) -> WorkerResult {
		let path = local_path(url)?;
		let meta = afs::metadata(&path).await.map_err(|e| io_error(e, ErrorCode::CannotSetTime, &path))?;
		let atime = FileTime::from_last_access_time(&meta);
		filetime::set_file_times(&path, atime, FileTime::from_unix_time(mtime, 0))
			.map_err(|e| io_error(e, ErrorCode::CannotSetTime, &path))
	}

	async fn copy(
		&mut self,
		ctx: &mut WorkerContext,
		src: &Url,
		dest: &Url,
		permissions: Option<u32>,
		overwrite: bool,
	) -> WorkerResult {
		let src_path = local_path(src)?;
		let dest_path = local_path(dest)?;

		let meta = afs::metadata(&src_path)
			.await
			.map_err(|e| io_error(e, ErrorCode::CannotOpenForReading, &src_path))?;
		if meta.is_dir() {
			return Err(JobError::new(ErrorCode::IsDirectory, src_path.display().to_string()));
		}
		if let Ok(m) = afs::symlink_metadata(&dest_path).await {
			if m.is_dir() || !overwrite {
				return Err(exists_error(&m, &dest_path));
			}
		}

		let mut input = afs::File::open(&src_path)
			.await
			.map_err(|e| io_error(e, ErrorCode::CannotOpenForReading, &src_path))?;
		let mut output = afs::File::create(&dest_path)
			.await
			.map_err(|e| io_error(e, ErrorCode::CannotOpenForWriting, &dest_path))?;
		ctx.total_size(meta.len()).await?;

		let mut buf = vec![0u8; STANDARD_BUFFER_SIZE];
		let mut processed = 0u64;
		let copied: WorkerResult = async {
			loop {
				if ctx.was_killed() {
					return Err(JobError::canceled());
				}
				let n = input.read(&mut buf).await.map_err(|e| io_error(e, ErrorCode::CannotRead, &src_path))?;
				if n == 0 {
					break;
				}
				output.write_all(&buf[..n]).await.map_err(|e| io_error(e, ErrorCode::CannotWrite, &dest_path))?;
				processed += n as u64;
				ctx.processed_size(processed).await?;
			}
			output.flush().await.map_err(|e| io_error(e, ErrorCode::CannotWrite, &dest_path))
		}
		.await;
		drop(output);

		if let Err(err) = copied {
			let _ = afs::remove_file(&dest_path).await;
			return Err(err);
		}

		let mode = permissions.unwrap_or(meta.mode() & 0o7777);
		afs::set_permissions(&dest_path, std::fs::Permissions::from_mode(mode))
			.await
			.map_err(|e| io_error(e, ErrorCode::CannotChmod, &dest_path))?;
		if let Err(e) = filetime::set_file_mtime(&dest_path, FileTime::from_last_modification_time(&meta)) {
			warn!("Cannot preserve modification time of {}: {}", dest_path.display(), e);
		}
		Ok(())
	}

	async fn del(&mut self, _ctx: &mut WorkerContext, url: &Url, is_file: bool) -> WorkerResult {
		let path = local_path(url)?;
		if is_file {
			afs::remove_file(&path).await.map_err(|e| io_error(e, ErrorCode::CannotDelete, &path))
		} else {
			afs::remove_dir(&path).await.map_err(|e| io_error(e, ErrorCode::CannotRmdir, &path))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_mime_by_extension() {
		assert_eq!(mime_for_path(Path::new("/a/b.TXT")), "text/plain");
		assert_eq!(mime_for_path(Path::new("/a/b.png")), "image/png");
		assert_eq!(mime_for_path(Path::new("/a/noext")), "application/octet-stream");
	}

	#[test]
	fn test_part_path() {
		assert_eq!(part_path(Path::new("/tmp/x.bin")), PathBuf::from("/tmp/x.bin.part"));
	}

	#[tokio::test]
	async fn test_stat_regular_file() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join(".hidden.txt");
		std::fs::write(&path, b"hello").unwrap();

		let entry = stat_path(&path).await.unwrap();
		assert_eq!(entry.name(), Some(".hidden.txt"));
		assert_eq!(entry.size(), Some(5));
		assert!(!entry.is_dir());
		assert_eq!(entry.number_value(field::HIDDEN), Some(1));
		assert_eq!(entry.number_value(field::FILE_TYPE), Some(file_type::REGULAR));
	}

	#[tokio::test]
	async fn test_stat_symlink_reports_target() {
		let dir = TempDir::new().unwrap();
		std::fs::create_dir(dir.path().join("sub")).unwrap();
		let link = dir.path().join("link");
		std::os::unix::fs::symlink("sub", &link).unwrap();

		let entry = stat_path(&link).await.unwrap();
		assert!(entry.is_link());
		assert!(entry.is_dir());
		assert_eq!(entry.string_value(field::LINK_DEST), Some("sub"));
	}
}

// vim: ts=4
