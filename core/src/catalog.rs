//! Reference catalog ingestion.
//!
//! Official foods come from a CSV dump of the reference table. Both ends of
//! an exchange are expected to load the same file, which is what makes a
//! bare `taco_id` portable.

use std::io::Read;

use anyhow::{Context, Result, bail};

use crate::identity;
use crate::models::Nutrients;

/// A single official food parsed from the catalog CSV.
#[derive(Debug, Clone)]
pub struct CatalogRow {
    pub taco_id: String,
    pub name: String,
    pub category: Option<String>,
    pub nutrients: Nutrients,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CatalogLoadSummary {
    pub rows_parsed: usize,
    pub foods_inserted: usize,
    pub foods_updated: usize,
}

/// Parse a catalog CSV from any reader.
///
/// Required headers are `taco_id` and `name`; `category` and any column
/// named after a nutrient field are optional. Unknown columns are ignored.
pub fn parse_catalog_csv<R: Read>(reader: R) -> Result<Vec<CatalogRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();

    let col =
        |name: &str| -> Option<usize> { headers.iter().position(|h| h.eq_ignore_ascii_case(name)) };

    let idx_id = col("taco_id").context("Missing required column: taco_id")?;
    let idx_name = col("name").context("Missing required column: name")?;
    let idx_category = col("category");
    let nutrient_cols: Vec<(&'static str, usize)> = Nutrients::COLUMNS
        .iter()
        .filter_map(|c| col(c).map(|i| (*c, i)))
        .collect();

    let mut rows = Vec::new();

    for (line_num, result) in rdr.records().enumerate() {
        let line = line_num + 2;
        let record = result.with_context(|| format!("Failed to parse CSV row {line}"))?;

        let taco_id = record.get(idx_id).unwrap_or("").to_string();
        let name = record.get(idx_name).unwrap_or("").to_string();
        if taco_id.is_empty() || name.is_empty() {
            continue;
        }
        if identity::is_custom_taco_id(&taco_id) {
            bail!("Row {line}: '{taco_id}' is in the custom food namespace");
        }

        let category = idx_category
            .and_then(|i| record.get(i))
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let mut pairs = Vec::with_capacity(nutrient_cols.len());
        for (column, idx) in &nutrient_cols {
            let raw = record.get(*idx).unwrap_or("");
            let value = parse_cell(raw)
                .with_context(|| format!("Row {line}: invalid value '{raw}' for {column}"))?;
            pairs.push((*column, value));
        }

        rows.push(CatalogRow {
            taco_id,
            name,
            category,
            nutrients: Nutrients::from_pairs(pairs),
        });
    }

    Ok(rows)
}

/// Blank, not-analysed (`NA`, `*`, `-`) and trace (`Tr`) cells carry no value.
/// Decimal commas are accepted.
fn parse_cell(raw: &str) -> Result<Option<f64>> {
    let v = raw.trim();
    if v.is_empty() || v == "*" || v == "-" || v.eq_ignore_ascii_case("na") || v.eq_ignore_ascii_case("tr")
    {
        return Ok(None);
    }
    let value: f64 = v.replace(',', ".").parse()?;
    if !value.is_finite() || value < 0.0 {
        bail!("out of range");
    }
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CSV: &str = "\
taco_id,name,category,energia_kcal,proteina_g,lipidios_g,sodio_mg
1,\"Arroz, integral, cozido\",Cereais e derivados,123.5,2.6,1.0,1.2
2,\"Arroz, tipo 1, cozido\",Cereais e derivados,128,2.5,0.2,Tr
3,Feijão carioca cozido,Leguminosas e derivados,\"76,4\",4.8,0.5,NA
";

    #[test]
    fn test_parse_catalog_csv_basic() {
        let rows = parse_catalog_csv(SAMPLE_CSV.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].taco_id, "1");
        assert_eq!(rows[0].name, "Arroz, integral, cozido");
        assert_eq!(rows[0].category.as_deref(), Some("Cereais e derivados"));
        assert_eq!(rows[0].nutrients.energia_kcal, Some(123.5));
        assert!(rows[1].nutrients.sodio_mg.is_none());
        assert_eq!(rows[2].nutrients.energia_kcal, Some(76.4));
        assert!(rows[2].nutrients.ferro_mg.is_none());
    }

    #[test]
    fn test_parse_catalog_csv_missing_required_column() {
        let result = parse_catalog_csv("name,energia_kcal\nArroz,120\n".as_bytes());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("taco_id"));
    }

    #[test]
    fn test_parse_catalog_csv_skips_blank_rows() {
        let csv = "taco_id,name\n1,Arroz\n,\n2,Feijão\n";
        let rows = parse_catalog_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_parse_catalog_csv_rejects_custom_namespace() {
        let csv = "taco_id,name\ncustom_1698765432100,Bolo\n";
        assert!(parse_catalog_csv(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_parse_catalog_csv_rejects_bad_number() {
        let csv = "taco_id,name,energia_kcal\n1,Arroz,lots\n";
        let err = parse_catalog_csv(csv.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("energia_kcal"));
    }
}
