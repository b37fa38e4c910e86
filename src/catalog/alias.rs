//! 目录别名：`<base>_<6 位小写字母数字>`
//!
//! 目录名必须唯一，注册时在基础名后追加随机后缀；调用远端时用去掉后缀的逻辑名。

/// 随机后缀长度
pub const ALIAS_SUFFIX_LEN: usize = 6;

fn is_alias_suffix(segment: &str) -> bool {
    segment.len() == ALIAS_SUFFIX_LEN
        && segment
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// 去掉恰好一个别名后缀；不满足后缀形态时原样返回
///
/// 对 generate_alias 产生的名字幂等：`strip(strip(x)) == strip(x)`。
pub fn strip_alias_suffix(name: &str) -> &str {
    match name.rsplit_once('_') {
        Some((base, suffix)) if !base.is_empty() && is_alias_suffix(suffix) => base,
        _ => name,
    }
}

/// 由基础名生成目录别名：空格转下划线，先去掉已有后缀，再追加新后缀
pub fn generate_alias(base: &str) -> String {
    let normalized = base.trim().replace(' ', "_");
    let mut base = normalized.as_str();
    loop {
        let stripped = strip_alias_suffix(base);
        if stripped == base {
            break;
        }
        base = stripped;
    }
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(ALIAS_SUFFIX_LEN)
        .collect();
    format!("{}_{}", base, suffix)
}
