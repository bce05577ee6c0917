//! Loading imported records from CSV.
//!
//! Expects the header row used by the data-entry export:
//!
//! ```text
//! "first_name","last_name","company_name","address","city","county","postal","phone1","phone2","email","web"
//! ```
//!
//! Unknown columns are ignored and missing ones come through as `None`, so
//! any CSV with a `postal` column is enough to drive the pipeline.

use std::path::Path;

use postcode_cluster_models::DataEntry;

use crate::AnalysisError;

/// Reads records from CSV data with a header row.
///
/// # Errors
///
/// Returns [`AnalysisError::Csv`] if a row cannot be parsed.
pub fn read_csv<R: std::io::Read>(reader: R) -> Result<Vec<DataEntry>, AnalysisError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut records = Vec::new();
    for row in rdr.deserialize() {
        let record: DataEntry = row?;
        records.push(record);
    }

    Ok(records)
}

/// Reads records from a CSV file.
///
/// # Errors
///
/// Returns [`AnalysisError::Io`] if the file cannot be opened, or
/// [`AnalysisError::Csv`] if a row cannot be parsed.
pub fn load_csv(path: &Path) -> Result<Vec<DataEntry>, AnalysisError> {
    let file = std::fs::File::open(path)?;
    let records = read_csv(std::io::BufReader::new(file))?;
    log::info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
\"first_name\",\"last_name\",\"company_name\",\"address\",\"city\",\"county\",\"postal\",\"phone1\",\"phone2\",\"email\",\"web\"
\"Aleshia\",\"Tomkiewicz\",\"Alan D Rosenburg Cpa Pc\",\"14 Taylor St\",\"St. Stephens Ward\",\"Kent\",\"CT2 7PP\",\"01835-703597\",\"01944-369967\",\"atomkiewicz@hotmail.com\",\"http://www.alandrosenburgcpapc.co.uk\"
\"Evan\",\"Zigomalas\",\"Cap Gemini America\",\"5 Binney St\",\"Abbey Ward\",\"Buckinghamshire\",\"HP11 2AX\",\"01937-864715\",\"01714-737668\",\"evan.zigomalas@gmail.com\",\"http://www.capgeminiamerica.co.uk\"
\"France\",\"Andrade\",\"\",\"8 Moor Place\",\"East Southbourne and Tuckton W\",\"Bournemouth\",\"\",\"01347-368222\",\"01935-821636\",\"france.andrade@hotmail.com\",\"http://www.simontonhoward.co.uk\"
";

    #[test]
    fn maps_headers_to_fields() {
        let records = read_csv(SAMPLE.as_bytes()).unwrap();
        assert_eq!(records.len(), 3);

        let first = &records[0];
        assert_eq!(first.first_name.as_deref(), Some("Aleshia"));
        assert_eq!(first.postal.as_deref(), Some("CT2 7PP"));
        assert_eq!(
            first.website.as_deref(),
            Some("http://www.alandrosenburgcpapc.co.uk")
        );
    }

    #[test]
    fn empty_fields_are_none() {
        let records = read_csv(SAMPLE.as_bytes()).unwrap();
        assert_eq!(records[2].postal, None);
        assert_eq!(records[2].company_name, None);
    }

    #[test]
    fn postal_column_alone_is_enough() {
        let records = read_csv("postal\nAB25 3UZ\n\nTN22 9EF\n".as_bytes()).unwrap();
        let codes: Vec<_> = records.iter().map(|r| r.postal.as_deref()).collect();
        assert_eq!(codes, vec![Some("AB25 3UZ"), Some("TN22 9EF")]);
        assert!(records[0].email.is_none());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_csv(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, AnalysisError::Io(_)));
    }
}
