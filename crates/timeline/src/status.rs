use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^(.*?)\s*\[(.*?)\]\s*$").expect("invalid bracket pattern"));
static LABELED_COMMA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*,\s*(трек-номер|адрес|телефон|индекс|получатель)\s*:")
        .expect("invalid label pattern")
});
static COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*,\s*").expect("invalid comma pattern"));

/// A status line split into its headline and the bracketed detail segments,
/// e.g. `Прибыл [Бишкек, трек-номер: LC1, адрес: Чуй 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusText {
    pub headline: String,
    pub details: Vec<String>,
}

impl StatusText {
    pub fn parse(text: &str) -> Self {
        let Some(captures) = BRACKETED.captures(text) else {
            return Self {
                headline: text.to_string(),
                details: Vec::new(),
            };
        };

        let headline = captures[1].trim().to_string();
        let inside = captures[2].trim();

        Self {
            headline,
            details: split_details(inside),
        }
    }

    pub fn has_details(&self) -> bool {
        !self.details.is_empty()
    }

    /// One line per detail segment, the first sharing the headline line.
    pub fn lines(&self) -> Vec<String> {
        if self.details.is_empty() {
            return vec![self.headline.clone()];
        }

        let last = self.details.len() - 1;
        self.details
            .iter()
            .enumerate()
            .map(|(index, segment)| {
                let mut line = if index == 0 {
                    format!("{} [{}", self.headline, segment)
                } else {
                    segment.clone()
                };
                line.push(if index == last { ']' } else { ',' });
                line
            })
            .collect()
    }
}

impl fmt::Display for StatusText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join("\n"))
    }
}

fn split_details(inside: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut start = 0;
    for captures in LABELED_COMMA.captures_iter(inside) {
        let (Some(whole), Some(label)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        segments.push(inside[start..whole.start()].to_string());
        start = label.start();
    }
    segments.push(inside[start..].to_string());

    if segments.len() == 1 {
        let pieces: Vec<&str> = COMMA.split(inside).collect();
        if pieces.len() >= 3 {
            return vec![
                pieces[0].to_string(),
                pieces[1].to_string(),
                pieces[2..].join(", "),
            ];
        }
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_status_has_no_details() {
        let parsed = StatusText::parse("Получен");
        assert_eq!(parsed.headline, "Получен");
        assert!(!parsed.has_details());
        assert_eq!(parsed.lines(), vec!["Получен"]);
    }

    #[test]
    fn splits_before_known_labels() {
        let parsed = StatusText::parse(
            "Прибыл в пункт выдачи [Бишкек, ул. Киевская, трек-номер: LC1, Адрес: Чуй 1, телефон: 0555]",
        );
        assert_eq!(parsed.headline, "Прибыл в пункт выдачи");
        assert_eq!(
            parsed.details,
            vec![
                "Бишкек, ул. Киевская",
                "трек-номер: LC1",
                "Адрес: Чуй 1",
                "телефон: 0555",
            ]
        );
        assert_eq!(
            parsed.lines(),
            vec![
                "Прибыл в пункт выдачи [Бишкек, ул. Киевская,",
                "трек-номер: LC1,",
                "Адрес: Чуй 1,",
                "телефон: 0555]",
            ]
        );
    }

    #[test]
    fn falls_back_to_first_two_commas() {
        let parsed = StatusText::parse("Отправлен [Урумчи, Китай, склад 3, ворота 2]");
        assert_eq!(
            parsed.details,
            vec!["Урумчи", "Китай", "склад 3, ворота 2"]
        );
    }

    #[test]
    fn short_bracket_content_stays_whole() {
        let parsed = StatusText::parse("Отправлен [Урумчи, Китай]");
        assert_eq!(parsed.details, vec!["Урумчи, Китай"]);
        assert_eq!(parsed.to_string(), "Отправлен [Урумчи, Китай]");
    }

    #[test]
    fn brackets_must_close_the_text() {
        let parsed = StatusText::parse("Отправлен [Урумчи] сегодня");
        assert!(!parsed.has_details());
        assert_eq!(parsed.headline, "Отправлен [Урумчи] сегодня");
    }
}
