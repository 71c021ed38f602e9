// Delimited text rendering with minimal quoting

use crate::port::QueryResult;

const QUOTE: char = '"';

fn needs_quotes(field: &str, delimiter: char) -> bool {
    field
        .chars()
        .any(|c| c == delimiter || c == QUOTE || c == '\n' || c == '\r')
}

fn push_field(out: &mut String, field: &str, delimiter: char) {
    if needs_quotes(field, delimiter) {
        out.push(QUOTE);
        for c in field.chars() {
            if c == QUOTE {
                out.push(QUOTE);
            }
            out.push(c);
        }
        out.push(QUOTE);
    } else {
        out.push_str(field);
    }
}

fn push_record<'a>(out: &mut String, fields: impl ExactSizeIterator<Item = &'a str>, delimiter: char) {
    let len = fields.len();
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(delimiter);
        }
        // A lone empty field would otherwise read back as a blank line
        if len == 1 && field.is_empty() {
            out.push_str("\"\"");
        } else {
            push_field(out, field, delimiter);
        }
    }
    out.push('\n');
}

/// Render a result set; NULL becomes an empty field
pub fn render_delimited(result: &QueryResult, delimiter: char, include_headers: bool) -> String {
    let mut out = String::new();
    if include_headers {
        push_record(&mut out, result.columns.iter().map(String::as_str), delimiter);
    }
    for row in &result.rows {
        push_record(
            &mut out,
            row.iter().map(|v| v.as_deref().unwrap_or("")),
            delimiter,
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(columns: &[&str], rows: &[&[Option<&str>]]) -> QueryResult {
        QueryResult {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|v| v.map(str::to_string)).collect())
                .collect(),
        }
    }

    #[test]
    fn test_minimal_quoting() {
        let r = result(
            &["id", "name", "note"],
            &[
                &[Some("1"), Some("Smith, John"), None],
                &[Some("2"), Some("plain"), Some("say \"hi\"")],
                &[Some("3"), Some("two\nlines"), Some("")],
            ],
        );
        assert_eq!(
            render_delimited(&r, ',', true),
            "id,name,note\n1,\"Smith, John\",\n2,plain,\"say \"\"hi\"\"\"\n3,\"two\nlines\",\n"
        );
    }

    #[test]
    fn test_custom_delimiter_without_headers() {
        let r = result(&["a", "b"], &[&[Some("x,y"), Some("p;q")]]);
        assert_eq!(render_delimited(&r, ';', false), "x,y;\"p;q\"\n");
    }

    #[test]
    fn test_carriage_returns_and_unicode() {
        let r = result(
            &["a", "b"],
            &[&[Some("line\r\nbreak"), Some("Zürich")], &[Some("\""), Some(" padded ")]],
        );
        assert_eq!(
            render_delimited(&r, ',', false),
            "\"line\r\nbreak\",Zürich\n\"\"\"\", padded \n"
        );
    }

    #[test]
    fn test_tab_delimiter_quotes_tabs_only() {
        let r = result(&["a", "b"], &[&[Some("x\ty"), Some("p,q")]]);
        assert_eq!(render_delimited(&r, '\t', false), "\"x\ty\"\tp,q\n");
    }

    #[test]
    fn test_headers_only_for_empty_result() {
        let r = result(&["id", "note, free text"], &[]);
        assert_eq!(render_delimited(&r, ',', true), "id,\"note, free text\"\n");
        assert_eq!(render_delimited(&r, ',', false), "");
    }

    #[test]
    fn test_single_empty_column() {
        let r = result(&["v"], &[&[None]]);
        assert_eq!(render_delimited(&r, ',', false), "\"\"\n");
    }
}
