pub mod dashboard;
pub mod plan;
pub mod topic_detail;
pub mod topics;

/// Shorten to `max_len` characters, marking the cut with an ellipsis.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

pub fn format_rate(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.0}%", v * 100.0),
        None => "-".to_string(),
    }
}

pub fn format_num(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}", v),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_strings() {
        assert_eq!(truncate("dp", 10), "dp");
        assert_eq!(truncate("two-sum", 7), "two-sum");
        assert_eq!(truncate("sliding-window", 10), "sliding...");
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("ääääääää", 6), "äää...");
    }

    #[test]
    fn optional_metrics() {
        assert_eq!(format_rate(Some(0.5)), "50%");
        assert_eq!(format_rate(None), "-");
        assert_eq!(format_num(Some(2.34)), "2.3");
    }
}
