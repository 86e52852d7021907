use std::env;
use std::str::FromStr;

use crate::error::EngineError;

/// 读取布尔型环境变量：支持 true/false/1/0（大小写不敏感）
pub fn env_is_true(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => {
            let v = v.trim();
            v.eq_ignore_ascii_case("true") || v == "1"
        }
        Err(_) => default,
    }
}

/// 读取字符串环境变量，若不存在则返回默认值
pub fn env_or_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(v) => v,
        Err(_) => default.to_string(),
    }
}

/// 读取数值环境变量，不存在或解析失败返回默认值
pub fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(v) => v.trim().parse::<T>().ok().unwrap_or(default),
        Err(_) => default,
    }
}

pub fn env_required(key: &str) -> Result<String, EngineError> {
    env::var(key).map_err(|_| EngineError::Config(format!("missing env var: {}", key)))
}

/// Comma separated list, empty entries skipped.
pub fn env_list(key: &str, default: &str) -> Vec<String> {
    env_or_default(key, default)
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_falls_back_on_garbage() {
        env::set_var("RUST_FX_TEST_BAD_NUMBER", "abc");
        assert_eq!(env_parse("RUST_FX_TEST_BAD_NUMBER", 7u64), 7);
        env::set_var("RUST_FX_TEST_GOOD_NUMBER", " 0.25 ");
        assert_eq!(env_parse("RUST_FX_TEST_GOOD_NUMBER", 1.0f64), 0.25);
    }

    #[test]
    fn list_skips_empty_entries() {
        env::set_var("RUST_FX_TEST_LIST", "USD_JPY, ,EUR_USD,");
        assert_eq!(
            env_list("RUST_FX_TEST_LIST", ""),
            vec!["USD_JPY".to_string(), "EUR_USD".to_string()]
        );
    }
}
