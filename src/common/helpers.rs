use std::time::Duration;

use anyhow::Error;

pub fn print_error_chain(err: &Error) {
    // Concatenate the main context message along with its chain of errors
    let error_message = err
        .chain()
        .enumerate()
        .map(|(index, cause)| {
            if index == 0 {
                cause.to_string()
            } else {
                format!("       └> {}", cause)
            }
        })
        .collect::<Vec<String>>()
        .join("\n");

    error!("{}", error_message);
}

pub fn format_seconds(elapsed: Duration) -> String {
    format!("{:.3}s", elapsed.as_secs_f32())
}

/// Turns a snake case migration name into the sentence shown by `status`,
/// e.g. `create_user_role` becomes `Create user role`.
pub fn humanize(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();

    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn humanize_capitalizes_first_word_only() {
        assert_eq!(humanize("create_user_role"), "Create user role");
        assert_eq!(humanize(""), "");
    }

    #[test]
    fn format_seconds_uses_millisecond_precision() {
        assert_eq!(format_seconds(Duration::from_millis(1500)), "1.500s");
    }
}
