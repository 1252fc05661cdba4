//! StoreLock - ストアディレクトリの排他ロック
//!
//! `<dir>/LOCK` に `flock(LOCK_EX | LOCK_NB)` を取り、`FilePacketStore` が
//! 生きている間保持する。2 つ目の open は待たずに `StoreError::Locked` で失敗する。
//! ファイルを閉じれば（プロセスが落ちても）ロックは OS が解放する。

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::domain::StoreError;

const LOCK_FILE: &str = "LOCK";

#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    // flock lives as long as this handle
    _file: File,
}

impl StoreLock {
    /// Take the lock for `dir` or fail with `Locked` if another holder has it.
    pub fn acquire(dir: &Path) -> Result<Self, StoreError> {
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        if !try_lock(&file)? {
            return Err(StoreError::Locked(dir.to_path_buf()));
        }
        write_owner(&file)?;
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn try_lock(file: &File) -> Result<bool, StoreError> {
    let res = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if res == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    if err.kind() == std::io::ErrorKind::WouldBlock {
        return Ok(false);
    }
    Err(StoreError::Io(err))
}

/// Record the holder's pid for operators; the flock is the real exclusion.
fn write_owner(file: &File) -> Result<(), StoreError> {
    let mut handle = file.try_clone()?;
    handle.set_len(0)?;
    handle.seek(SeekFrom::Start(0))?;
    writeln!(handle, "{}", std::process::id())?;
    Ok(())
}
