//! 格式模块
//!
//! properties 文本编解码、YAML 扁平化以及命名空间文件格式

pub mod file_format;
pub mod properties;
pub mod yaml;

// 重新导出主要类型
pub use file_format::ConfigFileFormat;
pub use properties::Properties;
