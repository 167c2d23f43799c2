use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Result};

use super::{BatteryProbe, BatteryStatus};

const POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";

/// Reads the first battery exposed under `/sys/class/power_supply`.
pub struct SysfsBattery {
    root: PathBuf,
}

impl SysfsBattery {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn find_battery(&self) -> Result<Option<PathBuf>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut batteries = entries
            .filter_map(|v| v.ok())
            .map(|v| v.path())
            .filter(|v| read_trimmed(&v.join("type")).is_ok_and(|t| t == "Battery"))
            .collect::<Vec<_>>();
        batteries.sort();
        Ok(batteries.into_iter().next())
    }
}

fn read_trimmed(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}

impl BatteryProbe for SysfsBattery {
    fn battery(&mut self) -> Result<Option<BatteryStatus>> {
        let Some(battery) = self.find_battery()? else {
            return Ok(None);
        };
        let capacity = read_trimmed(&battery.join("capacity"))?;
        let percent = capacity
            .parse::<u8>()
            .map_err(|e| anyhow!("Can't parse battery capacity {capacity:?}: {e}"))?;
        let charging = read_trimmed(&battery.join("status")).is_ok_and(|v| v == "Charging");
        Ok(Some(BatteryStatus {
            percent: percent.min(100),
            charging,
        }))
    }
}

/// Probe used when the window system doesn't provide its own.
pub fn default_probe() -> Option<Box<dyn BatteryProbe>> {
    if cfg!(target_os = "linux") {
        Some(Box::new(SysfsBattery::new(PathBuf::from(POWER_SUPPLY_DIR))))
    } else {
        None
    }
}
