/// Whole-percentage label for `loaded / total`, e.g. `"42%"`.
pub fn percent(loaded: u64, total: u64) -> String {
    if total == 0 {
        return "100%".to_string();
    }
    let loaded = loaded.min(total) as u128;
    let total = total as u128;
    format!("{}%", (loaded * 100 + total / 2) / total)
}

pub fn file_size(size: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    let mut value = size as f64;
    let mut unit = 0;

    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", size, UNITS[unit])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
