//! Hardware Inventory (C1, spec §4.1).
//!
//! Every sub-probe swallows its own errors and logs at debug: the inventory
//! must always be producible, even on a machine with no GPU, no NPU and an
//! unrecognized CPU. Grounded on the liveness-check style of
//! `tools/gpu-check`'s `Nvml::init()` probing, generalized to the other
//! vendors and to CPU/NPU detection the spec asks for.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cap {
    Cuda,
    Vulkan,
    Rocm,
    Metal,
    DirectMl,
    Npu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuClass {
    Discrete,
    Integrated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuInfo {
    pub vendor: String,
    pub microarch: String,
    pub cores: usize,
    pub threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuInfo {
    pub vendor: String,
    pub name: String,
    pub class: GpuClass,
    pub vram_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpuInfo {
    pub vendor: String,
    pub driver: String,
    pub power_mode: Option<String>,
}

/// Immutable snapshot of local hardware. Re-probed only on explicit request
/// (spec §3 lifecycle); nothing in this crate mutates one in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareInventory {
    pub cpu: CpuInfo,
    pub gpus: Vec<GpuInfo>,
    pub npu: Option<NpuInfo>,
    pub capabilities: HashSet<Cap>,
}

impl HardwareInventory {
    pub fn has(&self, cap: Cap) -> bool {
        self.capabilities.contains(&cap)
    }

    /// Best-matching CPU-microarch build directory component (spec §6
    /// native library search path `<bin_root>/<compute>/<os>/<cpu-microarch>/`).
    pub fn microarch_dir(&self) -> &str {
        &self.cpu.microarch
    }
}

impl fmt::Display for HardwareInventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} cores/{} threads, {}), {} GPU(s), NPU={}, caps={:?}",
            self.cpu.vendor,
            self.cpu.cores,
            self.cpu.threads,
            self.cpu.microarch,
            self.gpus.len(),
            self.npu.is_some(),
            self.capabilities,
        )
    }
}

/// Live RAM/VRAM totals and headroom, queried fresh on every call (unlike
/// [`HardwareInventory`], which is a point-in-time snapshot). Feeds the
/// Resource Manager's admission check (spec §4.6) and the `/resources`
/// endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MemoryStatus {
    pub total_ram_bytes: u64,
    pub free_ram_bytes: u64,
    pub total_vram_bytes: u64,
    pub free_vram_bytes: u64,
}

/// Reads `/proc/meminfo` for RAM and NVML for VRAM; anything unreadable
/// reports as zero rather than failing the caller.
pub fn memory_status() -> MemoryStatus {
    let (total_ram_bytes, free_ram_bytes) = read_proc_meminfo();
    let (total_vram_bytes, free_vram_bytes) = read_nvml_vram();
    MemoryStatus { total_ram_bytes, free_ram_bytes, total_vram_bytes, free_vram_bytes }
}

#[cfg(target_os = "linux")]
fn read_proc_meminfo() -> (u64, u64) {
    let Ok(text) = std::fs::read_to_string("/proc/meminfo") else { return (0, 0) };
    let mut total_kb = 0u64;
    let mut available_kb = 0u64;
    for line in text.lines() {
        let Some((key, rest)) = line.split_once(':') else { continue };
        let value = rest.trim().split_whitespace().next().and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
        match key {
            "MemTotal" => total_kb = value,
            "MemAvailable" => available_kb = value,
            _ => {}
        }
    }
    (total_kb * 1024, available_kb * 1024)
}

#[cfg(not(target_os = "linux"))]
fn read_proc_meminfo() -> (u64, u64) {
    (0, 0)
}

fn read_nvml_vram() -> (u64, u64) {
    use nvml_wrapper::Nvml;
    let Ok(nvml) = Nvml::init() else { return (0, 0) };
    let Ok(count) = nvml.device_count() else { return (0, 0) };
    let mut total = 0u64;
    let mut free = 0u64;
    for i in 0..count {
        let Ok(device) = nvml.device_by_index(i) else { continue };
        let Ok(mem) = device.memory_info() else { continue };
        total += mem.total;
        free += mem.free;
    }
    (total, free)
}

/// Probe every sub-system. Pure observation, no side effects beyond reading
/// the local machine (spec §4.1 contract).
pub fn probe() -> HardwareInventory {
    let cpu = probe_cpu();
    let gpus = probe_gpus();
    let npu = probe_npu(&cpu);
    let mut capabilities = probe_capabilities(&gpus);
    if npu.is_some() {
        capabilities.insert(Cap::Npu);
    }

    HardwareInventory { cpu, gpus, npu, capabilities }
}

fn probe_cpu() -> CpuInfo {
    #[cfg(target_os = "linux")]
    {
        if let Ok(text) = std::fs::read_to_string("/proc/cpuinfo") {
            return cpu_from_proc_cpuinfo(&text);
        }
        tracing::debug!("could not read /proc/cpuinfo; falling back to portable CPU class");
    }
    #[cfg(target_os = "macos")]
    {
        if let Some(info) = cpu_from_sysctl() {
            return info;
        }
        tracing::debug!("sysctl probe failed; falling back to portable CPU class");
    }

    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    CpuInfo {
        vendor: "unknown".into(),
        microarch: "portable".into(),
        cores: threads,
        threads,
    }
}

fn cpu_from_proc_cpuinfo(text: &str) -> CpuInfo {
    let mut vendor_id = String::new();
    let mut model_name = String::new();
    let mut family = 0i32;
    let mut model = 0i32;
    let mut threads = 0usize;

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else { continue };
        let key = key.trim();
        let value = value.trim();
        match key {
            "vendor_id" => vendor_id = value.to_string(),
            "model name" => model_name = value.to_string(),
            "cpu family" => family = value.parse().unwrap_or(0),
            "model" => model = value.parse().unwrap_or(0),
            "processor" => threads += 1,
            _ => {}
        }
    }

    let threads = threads.max(1);
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(threads)
        .min(threads)
        .max(1);

    let vendor = if vendor_id.contains("AMD") {
        "AMD".to_string()
    } else if vendor_id.contains("Intel") {
        "Intel".to_string()
    } else if !vendor_id.is_empty() {
        vendor_id
    } else {
        "unknown".to_string()
    };

    let microarch = classify_microarch(&vendor, family, model, &model_name);

    CpuInfo { vendor, microarch, cores, threads }
}

/// Named microarch from vendor/family/model, falling back to a generic
/// "portable" class when the combination is unrecognized (spec §4.1).
fn classify_microarch(vendor: &str, family: i32, model: i32, model_name: &str) -> String {
    let name = model_name.to_lowercase();
    match vendor {
        "AMD" if family == 25 => "zen4".to_string(),
        "AMD" if family == 24 || (family == 23 && model >= 96) => "zen3".to_string(),
        "AMD" if family == 23 => "zen2".to_string(),
        "Intel" if name.contains("ultra") => "meteorlake".to_string(),
        "Intel" if name.contains("13th gen") || name.contains("14th gen") => {
            "raptorlake".to_string()
        }
        "Intel" if name.contains("12th gen") => "alderlake".to_string(),
        "Intel" if name.contains("11th gen") => "tigerlake".to_string(),
        _ => "portable".to_string(),
    }
}

#[cfg(target_os = "macos")]
fn cpu_from_sysctl() -> Option<CpuInfo> {
    let brand = run_stdout("sysctl", &["-n", "machdep.cpu.brand_string"])?;
    let threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let vendor = if brand.contains("Apple") { "Apple".to_string() } else { "Intel".to_string() };
    let microarch = if brand.contains("Apple") { "apple-silicon".to_string() } else { "portable".to_string() };
    Some(CpuInfo { vendor, microarch, cores: threads, threads })
}

fn probe_gpus() -> Vec<GpuInfo> {
    let mut gpus = Vec::new();
    gpus.extend(probe_nvidia());
    gpus.extend(probe_amd_intel());
    gpus.extend(probe_apple());
    gpus
}

/// NVIDIA via NVML, the same liveness-check idiom as `tools/gpu-check`:
/// attempt to construct a session, discard it on any failure.
fn probe_nvidia() -> Vec<GpuInfo> {
    use nvml_wrapper::Nvml;

    let nvml = match Nvml::init() {
        Ok(n) => n,
        Err(e) => {
            tracing::debug!(error = %e, "NVML unavailable");
            return Vec::new();
        }
    };
    let count = match nvml.device_count() {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = %e, "NVML device_count failed");
            return Vec::new();
        }
    };

    let mut out = Vec::with_capacity(count as usize);
    for i in 0..count {
        let Ok(device) = nvml.device_by_index(i) else { continue };
        let name = device.name().unwrap_or_else(|_| "NVIDIA GPU".to_string());
        let vram_bytes = device.memory_info().ok().map(|m| m.total);
        out.push(GpuInfo {
            vendor: "NVIDIA".into(),
            name,
            class: GpuClass::Discrete,
            vram_bytes,
        });
    }
    out
}

/// AMD/Intel via the OS device inventory. On Linux this means walking the
/// DRM sysfs tree; elsewhere the probe degrades to empty (spec §4.1:
/// "errors from individual probes... degrade gracefully").
fn probe_amd_intel() -> Vec<GpuInfo> {
    #[cfg(target_os = "linux")]
    {
        let mut out = Vec::new();
        let Ok(entries) = std::fs::read_dir("/sys/class/drm") else { return out };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with("card") || name.contains('-') {
                continue;
            }
            let vendor_path = entry.path().join("device/vendor");
            let Ok(vendor_hex) = std::fs::read_to_string(&vendor_path) else { continue };
            let vendor = match vendor_hex.trim() {
                "0x1002" => "AMD",
                "0x8086" => "Intel",
                _ => continue,
            };
            let vram_path = entry.path().join("device/mem_info_vram_total");
            let vram_bytes = std::fs::read_to_string(&vram_path)
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok());
            let class = if vram_bytes.is_some() { GpuClass::Discrete } else { GpuClass::Integrated };
            out.push(GpuInfo {
                vendor: vendor.to_string(),
                name: format!("{vendor} GPU ({name})"),
                class,
                vram_bytes,
            });
        }
        out
    }
    #[cfg(not(target_os = "linux"))]
    {
        Vec::new()
    }
}

#[cfg(target_os = "macos")]
fn probe_apple() -> Vec<GpuInfo> {
    let Some(out) = run_stdout("system_profiler", &["SPDisplaysDataType"]) else { return Vec::new() };
    if out.contains("Apple M") || out.contains("Apple GPU") {
        vec![GpuInfo {
            vendor: "Apple".into(),
            name: "Apple Silicon GPU".into(),
            class: GpuClass::Integrated,
            vram_bytes: None,
        }]
    } else {
        Vec::new()
    }
}
#[cfg(not(target_os = "macos"))]
fn probe_apple() -> Vec<GpuInfo> {
    Vec::new()
}

/// NPU detection (spec §4.1): AMD via the compute-accelerator driver plus
/// power-mode utility; Intel via display-controller keywords and CPU-name
/// match for integrated NPU generations.
fn probe_npu(cpu: &CpuInfo) -> Option<NpuInfo> {
    #[cfg(target_os = "linux")]
    {
        if std::path::Path::new("/dev/accel/accel0").exists() {
            let power_mode = run_stdout("amd-smi", &["static", "-o"]).is_some().then(|| "auto".to_string());
            return Some(NpuInfo { vendor: "AMD".into(), driver: "amdxdna".into(), power_mode });
        }
    }
    if cpu.vendor == "Intel" && cpu.microarch == "meteorlake" {
        return Some(NpuInfo { vendor: "Intel".into(), driver: "intel-npu-acceleration".into(), power_mode: None });
    }
    None
}

/// Cheap native-library liveness checks, per capability (spec §4.1: "attempt
/// to import/construct a session, discard").
fn probe_capabilities(gpus: &[GpuInfo]) -> HashSet<Cap> {
    let mut caps = HashSet::new();

    if gpus.iter().any(|g| g.vendor == "NVIDIA") {
        caps.insert(Cap::Cuda);
    }
    if gpus.iter().any(|g| g.vendor == "AMD") {
        caps.insert(Cap::Rocm);
    }
    if cfg!(target_os = "macos") && gpus.iter().any(|g| g.vendor == "Apple") {
        caps.insert(Cap::Metal);
    }
    if cfg!(target_os = "windows") {
        caps.insert(Cap::DirectMl);
    }
    if !gpus.is_empty() && vulkan_loader_present() {
        caps.insert(Cap::Vulkan);
    }

    caps
}

fn vulkan_loader_present() -> bool {
    #[cfg(target_os = "linux")]
    {
        std::path::Path::new("/usr/lib/x86_64-linux-gnu/libvulkan.so.1").exists()
            || std::path::Path::new("/usr/lib/libvulkan.so.1").exists()
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

#[cfg(any(target_os = "macos"))]
fn run_stdout(cmd: &str, args: &[&str]) -> Option<String> {
    std::process::Command::new(cmd)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
}

#[cfg(target_os = "linux")]
fn run_stdout(cmd: &str, args: &[&str]) -> Option<String> {
    std::process::Command::new(cmd)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_microarch_falls_back_to_portable() {
        assert_eq!(classify_microarch("RISC-V", 0, 0, "some exotic core"), "portable");
    }

    #[test]
    fn classify_microarch_known_amd_family() {
        assert_eq!(classify_microarch("AMD", 25, 1, ""), "zen4");
    }

    #[test]
    fn probe_is_always_producible() {
        // Must never panic regardless of what hardware is actually present.
        let inv = probe();
        assert!(inv.cpu.cores >= 1);
    }

    #[test]
    fn cpu_from_proc_cpuinfo_counts_processors() {
        let text = "processor\t: 0\nvendor_id\t: GenuineIntel\nmodel name\t: 12th Gen Intel(R) Core(TM) i7\ncpu family\t: 6\nmodel\t: 154\n\nprocessor\t: 1\nvendor_id\t: GenuineIntel\nmodel name\t: 12th Gen Intel(R) Core(TM) i7\ncpu family\t: 6\nmodel\t: 154\n";
        let info = cpu_from_proc_cpuinfo(text);
        assert_eq!(info.threads, 2);
        assert_eq!(info.vendor, "Intel");
        assert_eq!(info.microarch, "alderlake");
    }
}
