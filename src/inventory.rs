//! Static hardware inventory.
//!
//! Host, CPU, memory and disks come from `sysinfo`. Firmware details it does
//! not expose (DMI BIOS strings, serials, memory modules, USB devices) are
//! read from sysfs under a configurable root.
//!
//! Every field is best effort: an unreadable source becomes `"Unknown"` (or an
//! empty list) instead of failing the whole inventory, since most DMI serials
//! are root-only.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, RefreshKind, System};
use tracing::debug;

const UNKNOWN: &str = "Unknown";
const NOT_AVAILABLE: &str = "N/A";

/// SMBIOS structure type of a memory device
const SMBIOS_MEMORY_DEVICE: u8 = 17;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessorInfo {
    pub model: String,
    pub cores: usize,
    pub threads: usize,
    pub frequency_mhz: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BiosInfo {
    pub vendor: String,
    pub version: String,
    pub release_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryModule {
    pub slot: String,
    pub size_bytes: u64,
    pub vendor: String,
    pub serial: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskInfo {
    pub name: String,
    pub mount_point: PathBuf,
    pub file_system: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsbDevice {
    /// `vendor:product` hex ids, e.g. `046d:c52b`
    pub id: String,
    pub vendor: String,
    pub product: String,
    pub serial: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineInfo {
    pub hostname: String,
    pub os: String,
    pub kernel: String,
    pub cpu: ProcessorInfo,
    pub memory_total_bytes: u64,
    pub memory_modules: Vec<MemoryModule>,
    pub bios: BiosInfo,
    pub board_serial: String,
    pub product_serial: String,
    pub disks: Vec<DiskInfo>,
    pub usb: Vec<UsbDevice>,
}

impl MachineInfo {
    /// Inventory of the running machine
    pub fn collect() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        let mut info = Self::from_system(&sys);
        info.disks = collect_disks(&Disks::new_with_refreshed_list());
        info.with_firmware_from(Path::new("/"))
    }

    /// Host, CPU and memory totals from an already refreshed `System`.
    /// Firmware fields start out unknown.
    pub fn from_system(sys: &System) -> Self {
        let cpus = sys.cpus();
        let cpu = ProcessorInfo {
            model: cpus
                .first()
                .map(|c| c.brand().trim().to_string())
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            cores: System::physical_core_count().unwrap_or(cpus.len()),
            threads: cpus.len(),
            frequency_mhz: if cpus.is_empty() {
                0.0
            } else {
                cpus.iter().map(|c| c.frequency() as f64).sum::<f64>() / cpus.len() as f64
            },
        };

        Self {
            hostname: System::host_name().unwrap_or_else(|| UNKNOWN.to_string()),
            os: System::long_os_version()
                .or_else(System::name)
                .unwrap_or_else(|| UNKNOWN.to_string()),
            kernel: System::kernel_version().unwrap_or_else(|| UNKNOWN.to_string()),
            cpu,
            memory_total_bytes: sys.total_memory(),
            memory_modules: Vec::new(),
            bios: BiosInfo {
                vendor: UNKNOWN.to_string(),
                version: UNKNOWN.to_string(),
                release_date: UNKNOWN.to_string(),
            },
            board_serial: UNKNOWN.to_string(),
            product_serial: UNKNOWN.to_string(),
            disks: Vec::new(),
            usb: Vec::new(),
        }
    }

    /// Fill DMI, memory module and USB details from sysfs relative to `root`
    /// (a real or fake filesystem root).
    pub fn with_firmware_from(mut self, root: &Path) -> Self {
        let dmi = |name: &str| {
            read_trimmed(&root.join("sys/class/dmi/id").join(name)).unwrap_or_else(|| UNKNOWN.to_string())
        };

        self.bios = BiosInfo {
            vendor: dmi("bios_vendor"),
            version: dmi("bios_version"),
            release_date: dmi("bios_date"),
        };
        self.board_serial = dmi("board_serial");
        self.product_serial = dmi("product_serial");
        self.memory_modules = collect_memory_modules(&root.join("sys/firmware/dmi/entries"), self.memory_total_bytes);
        self.usb = collect_usb(&root.join("sys/bus/usb/devices"));
        self
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Inventory source unavailable");
            None
        }
    }
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map(|rd| rd.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    entries.sort();
    entries
}

fn collect_disks(disks: &Disks) -> Vec<DiskInfo> {
    disks
        .list()
        .iter()
        .filter(|d| d.total_space() > 0)
        .map(|d| DiskInfo {
            name: d.name().to_string_lossy().into_owned(),
            mount_point: d.mount_point().to_path_buf(),
            file_system: d.file_system().to_string_lossy().into_owned(),
            size_bytes: d.total_space(),
        })
        .collect()
}

/// Installed modules from the DMI type-17 tables, or a single `Total` entry
/// when the tables are unreadable (they are root-only on most systems).
fn collect_memory_modules(entries_dir: &Path, total_bytes: u64) -> Vec<MemoryModule> {
    let modules: Vec<MemoryModule> = sorted_entries(entries_dir)
        .into_iter()
        .filter(|entry| {
            entry
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with("17-"))
        })
        .filter_map(|entry| match fs::read(entry.join("raw")) {
            Ok(raw) => parse_memory_device(&raw),
            Err(e) => {
                debug!(path = %entry.display(), error = %e, "DMI memory entry unreadable");
                None
            }
        })
        .collect();

    if !modules.is_empty() {
        return modules;
    }
    vec![MemoryModule {
        slot: "Total".to_string(),
        size_bytes: total_bytes,
        vendor: NOT_AVAILABLE.to_string(),
        serial: NOT_AVAILABLE.to_string(),
    }]
}

/// Decode one raw SMBIOS memory device structure. Empty slots and devices of
/// unknown size yield `None`.
pub fn parse_memory_device(raw: &[u8]) -> Option<MemoryModule> {
    if raw.first() != Some(&SMBIOS_MEMORY_DEVICE) {
        return None;
    }
    let len = *raw.get(1)? as usize;
    // Manufacturer and serial string indices end the 2.3 layout at 0x19
    if len < 0x19 || raw.len() < len {
        return None;
    }
    let formatted = &raw[..len];
    let word = |at: usize| u16::from_le_bytes([formatted[at], formatted[at + 1]]);

    let size_bytes = match word(0x0C) {
        0 | 0xFFFF => return None,
        0x7FFF => {
            let extended = formatted.get(0x1C..0x20)?;
            let mb = u32::from_le_bytes(extended.try_into().ok()?) & 0x7FFF_FFFF;
            u64::from(mb) * 1024 * 1024
        }
        // High bit selects kilobyte granularity
        size if size & 0x8000 != 0 => u64::from(size & 0x7FFF) * 1024,
        size => u64::from(size) * 1024 * 1024,
    };

    let strings: Vec<String> = raw[len..]
        .split(|b| *b == 0)
        .take_while(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).trim().to_string())
        .collect();
    let string_at = |offset: usize| {
        let index = formatted[offset] as usize;
        index
            .checked_sub(1)
            .and_then(|i| strings.get(i))
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| UNKNOWN.to_string())
    };

    Some(MemoryModule {
        slot: string_at(0x10),
        size_bytes,
        vendor: string_at(0x17),
        serial: string_at(0x18),
    })
}

fn collect_usb(devices_dir: &Path) -> Vec<UsbDevice> {
    sorted_entries(devices_dir)
        .into_iter()
        .filter_map(|dev| {
            // Interfaces (e.g. 1-1:1.0) have no idVendor and are skipped
            let vendor_id = read_trimmed(&dev.join("idVendor"))?;
            let product_id = read_trimmed(&dev.join("idProduct"))?;
            let attr = |name: &str| read_trimmed(&dev.join(name)).unwrap_or_else(|| UNKNOWN.to_string());
            Some(UsbDevice {
                id: format!("{}:{}", vendor_id, product_id),
                vendor: attr("manufacturer"),
                product: attr("product"),
                serial: attr("serial"),
            })
        })
        .collect()
}
