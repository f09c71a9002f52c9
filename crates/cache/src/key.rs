//! 缓存键编码

use std::fmt;

use dlmp_errors::{AppError, AppResult};

/// 区域名与本地键之间的分隔符
pub const KEY_SEPARATOR: char = ':';

/// 会被后端解释为模式的字符，不允许出现在区域名中
const GLOB_CHARS: [char; 4] = ['*', '?', '[', ']'];

/// 规范缓存键
///
/// 区域名不含分隔符，因此 `region:localKey` 对每个 (region, localKey) 唯一，
/// 本地键本身可以包含分隔符（如 `info:42`）。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    region: String,
    local_key: String,
}

impl CacheKey {
    pub fn new(region: impl Into<String>, local_key: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            local_key: local_key.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn local_key(&self) -> &str {
        &self.local_key
    }

    /// 规范字符串：`region:localKey`
    pub fn canonical(&self) -> String {
        format!("{}{}{}", self.region, KEY_SEPARATOR, self.local_key)
    }

    /// 匹配整个区域的模式：`region:*`
    pub fn region_pattern(region: &str) -> String {
        format!("{}{}*", region, KEY_SEPARATOR)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.region, KEY_SEPARATOR, self.local_key)
    }
}

/// 用分隔符拼接本地键片段，例如 `compose(&["info", "42"])` → `info:42`
pub fn compose(parts: &[&str]) -> String {
    let mut key = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        key.push_str(part);
    }
    key
}

/// 校验区域名
pub fn validate_region_name(region: &str) -> AppResult<()> {
    if region.is_empty() {
        return Err(AppError::configuration("Cache region name cannot be empty"));
    }
    if region.contains(KEY_SEPARATOR) {
        return Err(AppError::configuration(format!(
            "Cache region name '{}' must not contain '{}'",
            region, KEY_SEPARATOR
        )));
    }
    if region
        .chars()
        .any(|c| GLOB_CHARS.contains(&c) || c.is_whitespace())
    {
        return Err(AppError::configuration(format!(
            "Cache region name '{}' contains pattern or whitespace characters",
            region
        )));
    }
    Ok(())
}
