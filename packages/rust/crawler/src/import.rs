//! CSV lead import (`company_name,email,category`).

use std::path::Path;

use tracing::{debug, info, instrument};

use leadflow_shared::{LeadflowError, NewLead, Result};
use leadflow_storage::Storage;

/// Outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub imported: usize,
    /// Rows whose email was already stored.
    pub duplicates: usize,
    /// Malformed rows (too few fields, no `@`, truncated email).
    pub skipped: usize,
}

/// A well-formed CSV row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    pub company_name: String,
    pub email: String,
    pub category: String,
}

/// Import every row of the CSV file at `path`.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn import_csv(storage: &Storage, path: &Path) -> Result<ImportStats> {
    let content = std::fs::read_to_string(path).map_err(|e| LeadflowError::io(path, e))?;
    import_rows(storage, &content).await
}

/// Import CSV text (header optional).
pub async fn import_rows(storage: &Storage, content: &str) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() || (line_no == 0 && is_header(line)) {
            continue;
        }
        let Some(row) = parse_row(line) else {
            debug!(line = line_no + 1, "skipping malformed row");
            stats.skipped += 1;
            continue;
        };

        let lead = NewLead::new(&row.company_name, &row.email, "import").with_category(&row.category);
        match storage.insert_lead(&lead).await {
            Ok(Some(_)) => {
                info!(company = %row.company_name, email = %row.email, "imported");
                stats.imported += 1;
            }
            Ok(None) => {
                info!(email = %row.email, "already in store, skipped");
                stats.duplicates += 1;
            }
            Err(LeadflowError::Validation { message }) => {
                debug!(line = line_no + 1, %message, "skipping invalid row");
                stats.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        imported = stats.imported,
        duplicates = stats.duplicates,
        skipped = stats.skipped,
        "import complete"
    );
    Ok(stats)
}

fn is_header(line: &str) -> bool {
    line.trim_start_matches('\u{feff}')
        .trim()
        .to_ascii_lowercase()
        .starts_with("company_name")
}

/// Parse one line. Returns `None` for rows that must be skipped.
pub fn parse_row(line: &str) -> Option<ImportRow> {
    let fields = split_fields(line);
    if fields.len() < 3 {
        return None;
    }
    let company_name = fields[0].trim();
    let email = fields[1].trim();
    let category = fields[2].trim();

    // Copy-pasted lists sometimes carry truncated addresses.
    if email.ends_with("...") || !email.contains('@') || company_name.is_empty() {
        return None;
    }

    Some(ImportRow {
        company_name: company_name.to_string(),
        email: email.to_string(),
        category: category.to_string(),
    })
}

/// Split a CSV line on commas, honoring double-quoted fields.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn parses_plain_and_quoted_rows() {
        let row = parse_row("Rockwood Dental,info@rockwooddental.com,Dentist").unwrap();
        assert_eq!(row.company_name, "Rockwood Dental");
        assert_eq!(row.category, "Dentist");

        let row = parse_row(r#""Smith, Jones & Co",office@smithjones.ca,Law Firm"#).unwrap();
        assert_eq!(row.company_name, "Smith, Jones & Co");
        assert_eq!(row.email, "office@smithjones.ca");
    }

    #[test]
    fn rejects_bad_rows() {
        assert!(parse_row("Only Two,fields@x.ca").is_none());
        assert!(parse_row("No At,not-an-email,Cafe").is_none());
        assert!(parse_row("Truncated,someone@longdomainna...,Cafe").is_none());
    }

    #[tokio::test]
    async fn import_counts_rows() {
        let tmp = std::env::temp_dir().join(format!("lf_import_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&tmp).await.unwrap();

        let csv = "company_name,email,category\n\
                   Texas Longhorn,info@thetexaslonghorn.ca,Restaurant\n\
                   \n\
                   Broken Row,oops\n\
                   Texas Longhorn Again,INFO@thetexaslonghorn.ca,Restaurant\n\
                   Wok This Way,takeout@bellnet.ca,Restaurant\n";
        let stats = import_rows(&storage, csv).await.unwrap();
        assert_eq!(
            stats,
            ImportStats {
                imported: 2,
                duplicates: 1,
                skipped: 1
            }
        );

        let lead = storage
            .get_lead_by_email("takeout@bellnet.ca")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lead.source, "import");
        assert_eq!(lead.category.as_deref(), Some("Restaurant"));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let tmp = std::env::temp_dir().join(format!("lf_import_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&tmp).await.unwrap();
        let err = import_csv(&storage, Path::new("/nonexistent/leads.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, LeadflowError::Io { .. }));
    }
}
