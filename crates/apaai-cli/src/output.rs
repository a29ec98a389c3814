use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Left-aligned columns separated by two spaces, with a dashed rule under
/// the header.
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    for line in render_table(headers, &rows) {
        println!("{line}");
    }
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:w$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(line(headers.to_vec()));
    out.push(
        widths
            .iter()
            .map(|&w| "-".repeat(w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in rows {
        out.push(line(row.iter().map(String::as_str).collect()));
    }
    out
}

/// `label  value` pairs with aligned values; `None` values are skipped.
pub fn print_fields(fields: &[(&str, Option<String>)]) {
    let width = fields.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (key, value) in fields {
        if let Some(value) = value {
            println!("{key:width$}  {value}");
        }
    }
}

/// Keep the first four characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let shown: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{shown}****")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_columns_align() {
        let lines = render_table(
            &["ID", "STATUS"],
            &[
                vec!["a_1".into(), "approved".into()],
                vec!["a_200".into(), "requires_approval".into()],
            ],
        );
        assert_eq!(lines[0], "ID     STATUS");
        assert_eq!(lines[1], "-----  -----------------");
        assert_eq!(lines[2], "a_1    approved");
        assert_eq!(lines[3], "a_200  requires_approval");
    }

    #[test]
    fn short_rows_do_not_panic() {
        let lines = render_table(&["A", "B"], &[vec!["x".into()]]);
        assert_eq!(lines[2], "x");
    }

    #[test]
    fn secrets_are_masked() {
        assert_eq!(mask_secret("sk_live_abcdef"), "sk_l****");
        assert_eq!(mask_secret("abc"), "****");
    }
}
