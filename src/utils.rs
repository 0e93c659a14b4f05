//! Host statistics and small formatting helpers for status replies

use std::path::Path;

const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Capacity of the filesystem holding a path
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiskUsage {
    /// Total size in bytes
    pub total: u64,
    /// Bytes available to unprivileged users
    pub available: u64,
}

impl DiskUsage {
    /// Bytes in use (`total - available`)
    pub fn used(&self) -> u64 {
        self.total.saturating_sub(self.available)
    }

    /// Used share in percent, 0 for an empty filesystem
    pub fn percent_used(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.used() as f64 * 100.0 / self.total as f64
    }
}

/// Query total and available space of the filesystem containing `path`.
///
/// Uses `statvfs` on unix and `GetDiskFreeSpaceExW` on Windows.
pub fn disk_usage(path: &Path) -> std::io::Result<DiskUsage> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid NUL-terminated string, stat is zero-initialized
        // and only read after statvfs reports success.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            #[allow(clippy::useless_conversion)]
            let frsize = u64::from(stat.f_frsize);
            #[allow(clippy::useless_conversion)]
            let (blocks, bavail) = (u64::from(stat.f_blocks), u64::from(stat.f_bavail));
            Ok(DiskUsage {
                total: blocks.saturating_mul(frsize),
                available: bavail.saturating_mul(frsize),
            })
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is NUL-terminated and the out-pointers reference
        // live, aligned u64 locals that are only read on success.
        unsafe {
            let mut available: u64 = 0;
            let mut total: u64 = 0;
            let mut _free: u64 = 0;
            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut available as *mut u64 as *mut _,
                &mut total as *mut u64 as *mut _,
                &mut _free as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }
            Ok(DiskUsage { total, available })
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = path;
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "disk usage is not supported on this platform",
        ))
    }
}

/// Memory figures from `/proc/meminfo`, in bytes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    /// MemTotal
    pub total: u64,
    /// MemAvailable (falls back to MemFree on old kernels)
    pub available: u64,
}

/// Parse the text of `/proc/meminfo`
pub fn parse_meminfo(text: &str) -> Option<MemoryInfo> {
    let field = |name: &str| -> Option<u64> {
        text.lines().find_map(|line| {
            let rest = line.strip_prefix(name)?.strip_prefix(':')?;
            let kib: u64 = rest.split_whitespace().next()?.parse().ok()?;
            Some(kib * 1024)
        })
    };
    let total = field("MemTotal")?;
    let available = field("MemAvailable").or_else(|| field("MemFree"))?;
    Some(MemoryInfo { total, available })
}

/// Read memory figures; `None` where `/proc/meminfo` is unavailable
pub async fn memory_info() -> Option<MemoryInfo> {
    let text = tokio::fs::read_to_string("/proc/meminfo").await.ok()?;
    parse_meminfo(&text)
}

/// Parse the 1/5/15 minute averages from `/proc/loadavg`
pub fn parse_loadavg(text: &str) -> Option<[f64; 3]> {
    let mut fields = text.split_whitespace().map(str::parse::<f64>);
    Some([
        fields.next()?.ok()?,
        fields.next()?.ok()?,
        fields.next()?.ok()?,
    ])
}

/// Read load averages; `None` where `/proc/loadavg` is unavailable
pub async fn load_average() -> Option<[f64; 3]> {
    let text = tokio::fs::read_to_string("/proc/loadavg").await.ok()?;
    parse_loadavg(&text)
}

/// `12.34 MB`
pub fn format_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / MIB)
}

/// `1.50 GB`
pub fn format_gb(bytes: u64) -> String {
    format!("{:.2} GB", bytes as f64 / GIB)
}

/// Reduce a name supplied by a remote user to a single safe path component
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next()?.trim();
    if base.is_empty() || base == "." || base == ".." {
        return None;
    }
    Some(base.to_string())
}
