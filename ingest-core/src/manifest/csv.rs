/// Split CSV text into records of fields.
///
/// Comma separated, `"` quoting with `""` as an escaped quote; quoted fields
/// may span lines. LF and CRLF both end a record. Returns None when a quoted
/// field is never closed.
pub fn split_records(text: &str) -> Option<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    // distinguishes an empty trailing line from a record with one empty field
    let mut dirty = false;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                dirty = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                dirty = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                if dirty || !field.is_empty() {
                    record.push(std::mem::take(&mut field));
                }
                records.push(std::mem::take(&mut record));
                dirty = false;
            }
            _ => {
                field.push(c);
                dirty = true;
            }
        }
    }
    if in_quotes {
        return None;
    }
    if dirty || !field.is_empty() {
        record.push(field);
        records.push(record);
    }
    Some(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_quoted_fields() {
        let recs = split_records("a,b,c\n\"x,y\",\"say \"\"hi\"\"\",\r\n").unwrap();
        assert_eq!(
            recs,
            vec![
                vec!["a", "b", "c"],
                vec!["x,y", "say \"hi\"", ""],
            ]
        );
    }

    #[test]
    fn quoted_newline_stays_in_field() {
        let recs = split_records("\"line1\nline2\",z").unwrap();
        assert_eq!(recs, vec![vec!["line1\nline2", "z"]]);
    }

    #[test]
    fn blank_lines_are_empty_records() {
        let recs = split_records("a\n\nb\n").unwrap();
        assert_eq!(recs.len(), 3);
        assert!(recs[1].is_empty());
    }

    #[test]
    fn unterminated_quote() {
        assert!(split_records("a,\"open\n").is_none());
    }
}
