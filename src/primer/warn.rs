/// One token per value: whitespace runs become `_`, non-printable characters go.
fn sanitize_value(value: &str) -> String {
    let joined = value
        .split_ascii_whitespace()
        .map(|word| word.chars().filter(char::is_ascii_graphic).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if joined.is_empty() {
        "na".to_string()
    } else {
        joined
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WarnEvent<'a> {
    pub code: &'a str,
    pub stage: &'a str,
    pub action: &'a str,
    pub outcome: &'a str,
    pub retry: &'a str,
    pub reason: &'a str,
    pub err: &'a str,
}

pub fn format_line(event: &WarnEvent<'_>) -> String {
    format!(
        "PRIMER_WARN code={} stage={} action={} outcome={} retry={} reason={} err={}",
        sanitize_value(event.code),
        sanitize_value(event.stage),
        sanitize_value(event.action),
        sanitize_value(event.outcome),
        sanitize_value(event.retry),
        sanitize_value(event.reason),
        sanitize_value(event.err),
    )
}

pub fn emit(event: WarnEvent<'_>) {
    eprintln!("{}", format_line(&event));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_value_rewrites_whitespace() {
        assert_eq!(sanitize_value("a b\tc"), "a_b_c");
    }

    #[test]
    fn sanitize_value_falls_back_for_empty() {
        assert_eq!(sanitize_value("   "), "na");
    }

    #[test]
    fn line_is_single_key_value_record() {
        let line = format_line(&WarnEvent {
            code: "KICKOFF_FAILED",
            stage: "active",
            action: "send-kickoff",
            outcome: "failed",
            retry: "backoff 4s",
            reason: "non-zero exit",
            err: "rc=1\nsession expired",
        });
        assert_eq!(
            line,
            "PRIMER_WARN code=KICKOFF_FAILED stage=active action=send-kickoff outcome=failed retry=backoff_4s reason=non-zero_exit err=rc=1_session_expired"
        );
    }
}
