use serde::{Deserialize, Serialize};
use std::env;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

/// 应用配置管理模块
/// 集中管理所有配置项，提供默认值和配置验证

/// 主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowConfig,
    pub mqtt: MqttConfig,
    pub serial: SerialConfig,
    pub buffer: BufferConfig,
    pub plot: PlotConfig,
    pub database: DatabaseConfig,
    pub export: ExportConfig,
    pub channels: ChannelConfig,
}

/// 窗口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: f32,
    pub height: f32,
    pub title: String,
    pub resizable: bool,
    pub vsync: bool,
}

/// MQTT配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub qos: u8,
    pub keep_alive: u16,
    pub use_tls: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// 串口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub timeout_ms: u64,
}

/// 实时缓冲区配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub capacity: usize,
    pub refresh_interval_ms: u64,
}

/// 绘图配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub plot_height: f32,
    pub show_axes: bool,
    pub allow_drag: bool,
    pub allow_zoom: bool,
    pub colors: PlotColors,
}

/// 绘图颜色配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotColors {
    pub x_axis: [u8; 3],
    pub y_axis: [u8; 3],
    pub z_axis: [u8; 3],
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub batch_size: usize,
    pub auto_create_dir: bool,
}

/// 导出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub directory: String,
    pub documents_file: String,
    pub cleaned_file: String,
}

/// 通道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub sample_channel_capacity: usize,
    pub db_task_channel_capacity: usize,
    pub save_result_channel_capacity: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 800.0,
            title: "sensorlink - Live Sensor Data".to_string(),
            resizable: true,
            vsync: true,
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "sensorlink_client".to_string(),
            topic: "sensor/gyro".to_string(),
            qos: 1,
            keep_alive: 60,
            use_tls: false,
            username: None,
            password: None,
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            timeout_ms: 1000,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 200,
            refresh_interval_ms: 100,
        }
    }
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            plot_height: 150.0,
            show_axes: true,
            allow_drag: false,
            allow_zoom: false,
            colors: PlotColors::default(),
        }
    }
}

impl Default for PlotColors {
    fn default() -> Self {
        Self {
            x_axis: [255, 0, 0],    // 红色
            y_axis: [0, 160, 0],    // 绿色
            z_axis: [0, 0, 255],    // 蓝色
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/sensor_data.db".to_string(),
            batch_size: 50,
            auto_create_dir: true,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: "data_export".to_string(),
            documents_file: "gyroscope_data.csv".to_string(),
            cleaned_file: "cleaned_gyroscope_data.csv".to_string(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            sample_channel_capacity: 5000,
            db_task_channel_capacity: 100,
            save_result_channel_capacity: 100,
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::IoError)?;

        let config: AppConfig = toml::from_str(&content).map_err(ConfigError::ParseError)?;

        config.validate()?;
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::SerializeError)?;

        std::fs::write(path, content).map_err(ConfigError::IoError)?;

        Ok(())
    }

    /// Overlay `.env` / process environment on top of the file values.
    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user) = lookup("MQTT_USER") {
            self.mqtt.username = Some(user);
        }
        if let Some(pass) = lookup("MQTT_PASS") {
            self.mqtt.password = Some(pass);
        }
        if let Some(host) = lookup("MQTT_HOST") {
            self.mqtt.broker = host;
        }
        if let Some(port) = lookup("MQTT_PORT") {
            self.mqtt.port = port
                .parse::<u16>()
                .map_err(|e| ConfigError::ValidationError(format!("MQTT_PORT: {}", e)))?;
        }
        if let Some(port) = lookup("SERIAL_PORT") {
            self.serial.port = port;
        }
        self.validate()
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width <= 0.0 || self.window.height <= 0.0 {
            return Err(ConfigError::ValidationError("Window dimensions must be positive".to_string()));
        }

        if self.buffer.capacity == 0 {
            return Err(ConfigError::ValidationError("Buffer capacity must be positive".to_string()));
        }

        if self.buffer.refresh_interval_ms == 0 {
            return Err(ConfigError::ValidationError("Refresh interval must be positive".to_string()));
        }

        if self.mqtt.qos > 2 {
            return Err(ConfigError::ValidationError(format!("Invalid MQTT QoS level {}", self.mqtt.qos)));
        }

        if self.database.batch_size == 0 {
            return Err(ConfigError::ValidationError("Database batch size must be positive".to_string()));
        }

        if self.channels.sample_channel_capacity == 0
            || self.channels.db_task_channel_capacity == 0
            || self.channels.save_result_channel_capacity == 0
        {
            return Err(ConfigError::ValidationError("Channel capacities must be positive".to_string()));
        }

        Ok(())
    }

    pub fn buffer_capacity(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.buffer.capacity)
            .ok_or_else(|| ConfigError::ValidationError("Buffer capacity must be positive".to_string()))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.buffer.refresh_interval_ms)
    }

    pub fn get_export_directory(&self) -> PathBuf {
        PathBuf::from(&self.export.directory)
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(toml::de::Error),
    #[error("Serialize error: {0}")]
    SerializeError(toml::ser::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// 配置管理器
pub struct ConfigManager {
    config: AppConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// 创建配置管理器
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            config_path: None,
        }
    }

    /// 从文件加载配置
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let config = AppConfig::load_from_file(&path)?;
        Ok(Self {
            config,
            config_path: Some(path.as_ref().to_path_buf()),
        })
    }

    /// File if given (written with defaults when missing), then environment.
    pub fn load_or_default(path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // 加载 .env 文件
        Self::load_or_default_with(path, |key| env::var(key).ok())
    }

    /// Same as [`ConfigManager::load_or_default`] with overrides taken from `lookup`.
    pub fn load_or_default_with<F>(path: Option<&std::path::Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut manager = match path {
            Some(path) if path.exists() => Self::load_from_file(path)?,
            Some(path) => {
                let manager = Self {
                    config: AppConfig::default(),
                    config_path: Some(path.to_path_buf()),
                };
                manager.save()?;
                log::info!("Wrote default configuration to {}", path.display());
                manager
            }
            None => Self::new(),
        };
        manager.config.apply_overrides(lookup)?;
        Ok(manager)
    }

    /// 获取当前配置
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    /// 保存配置
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.config_path {
            self.config.save_to_file(path)?;
        }
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
