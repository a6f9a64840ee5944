//! Per-device and system log retention

use std::collections::{HashMap, VecDeque};

use mdeck_core::{DeviceId, LogEntry, LogLevel, LogSource, MAX_LOG_LINES};

/// One capped channel; the oldest entry goes once `capacity` is reached
#[derive(Debug)]
struct LogChannel {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogChannel {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    fn push(&mut self, entry: LogEntry) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// Capped log buffers: one per device plus one system channel.
///
/// Device buffers outlive their session so logs stay viewable after a stop.
#[derive(Debug)]
pub struct LogBuffers {
    capacity: usize,
    devices: HashMap<DeviceId, LogChannel>,
    system: LogChannel,
}

impl Default for LogBuffers {
    fn default() -> Self {
        Self::new(MAX_LOG_LINES)
    }
}

impl LogBuffers {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            devices: HashMap::new(),
            system: LogChannel::new(capacity),
        }
    }

    /// Append a raw process line to a device's buffer.
    ///
    /// The level is detected from the line's prefix, falling back to the
    /// stream it came from.
    pub fn push_line(&mut self, device_id: &DeviceId, line: &str, from_stderr: bool) {
        let source = if from_stderr {
            LogSource::Stderr
        } else {
            LogSource::Stdout
        };
        let entry = LogEntry::new(LogLevel::detect(line, from_stderr), source, line);
        let capacity = self.capacity;
        self.devices
            .entry(device_id.clone())
            .or_insert_with(|| LogChannel::new(capacity))
            .push(entry);
    }

    /// Append a coordinator diagnostic to the system buffer
    pub fn push_system(&mut self, level: LogLevel, message: impl Into<String>) {
        self.system
            .push(LogEntry::new(level, LogSource::System, message));
    }

    pub fn device(&self, device_id: &DeviceId) -> Vec<LogEntry> {
        self.devices
            .get(device_id)
            .map(LogChannel::to_vec)
            .unwrap_or_default()
    }

    pub fn system(&self) -> Vec<LogEntry> {
        self.system.to_vec()
    }

    pub fn device_len(&self, device_id: &DeviceId) -> usize {
        self.devices.get(device_id).map_or(0, LogChannel::len)
    }

    pub fn system_len(&self) -> usize {
        self.system.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_follow_prefix_then_stream() {
        let mut logs = LogBuffers::default();
        let d = DeviceId::from("D1");
        logs.push_line(&d, "ERROR: Failed to install /a.apk", false);
        logs.push_line(&d, "[server] starting", true);
        logs.push_line(&d, "scrcpy 2.4", false);

        let levels: Vec<LogLevel> = logs.device(&d).iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![LogLevel::Error, LogLevel::Warning, LogLevel::Info]);
        assert_eq!(logs.device(&d)[1].source, LogSource::Stderr);
    }

    #[test]
    fn test_device_buffer_capped_oldest_first() {
        let mut logs = LogBuffers::default();
        let d = DeviceId::from("D1");
        for i in 0..(MAX_LOG_LINES + 5) {
            logs.push_line(&d, &format!("line {}", i), false);
        }
        let entries = logs.device(&d);
        assert_eq!(entries.len(), MAX_LOG_LINES);
        assert_eq!(entries[0].message, "line 5");
        assert_eq!(
            entries[MAX_LOG_LINES - 1].message,
            format!("line {}", MAX_LOG_LINES + 4)
        );
    }

    #[test]
    fn test_system_buffer_capped() {
        let mut logs = LogBuffers::default();
        for i in 0..(MAX_LOG_LINES * 2) {
            logs.push_system(LogLevel::Info, format!("sys {}", i));
        }
        assert_eq!(logs.system_len(), MAX_LOG_LINES);
        assert_eq!(logs.system()[0].message, format!("sys {}", MAX_LOG_LINES));
    }

    #[test]
    fn test_buffers_are_per_device() {
        let mut logs = LogBuffers::new(2);
        let a = DeviceId::from("A");
        let b = DeviceId::from("B");
        logs.push_line(&a, "1", false);
        logs.push_line(&a, "2", false);
        logs.push_line(&a, "3", false);
        logs.push_line(&b, "x", false);

        assert_eq!(logs.device_len(&a), 2);
        assert_eq!(logs.device_len(&b), 1);
        assert_eq!(logs.device_len(&DeviceId::from("C")), 0);
        assert!(logs.device(&DeviceId::from("C")).is_empty());
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let mut logs = LogBuffers::new(0);
        logs.push_system(LogLevel::Info, "dropped");
        logs.push_line(&DeviceId::from("A"), "dropped", false);
        assert_eq!(logs.system_len(), 0);
        assert_eq!(logs.device_len(&DeviceId::from("A")), 0);
    }
}
