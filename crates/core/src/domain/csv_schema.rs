// CSV Import Schema
//
// Header: sku,name,price,category,stock,imageUrl

use crate::domain::product::{InvalidRow, Product, RawProduct, RowValidationError};
use csv::StringRecord;

pub const COL_SKU: &str = "sku";
pub const COL_NAME: &str = "name";
pub const COL_PRICE: &str = "price";
pub const COL_CATEGORY: &str = "category";
pub const COL_STOCK: &str = "stock";
pub const COL_IMAGE_URL: &str = "imageUrl";

/// Required columns, in canonical order
pub const REQUIRED_COLUMNS: [&str; 6] = [
    COL_SKU,
    COL_NAME,
    COL_PRICE,
    COL_CATEGORY,
    COL_STOCK,
    COL_IMAGE_URL,
];

const UTF8_BOM: char = '\u{feff}';

/// Header validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    pub missing: Vec<String>,
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "missing required column(s): {} (expected header: {})",
            self.missing.join(","),
            REQUIRED_COLUMNS.join(",")
        )
    }
}

/// Column positions resolved from a header row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvSchema {
    sku: usize,
    name: usize,
    price: usize,
    category: usize,
    stock: usize,
    image_url: usize,
    /// Field count every data record must have
    width: usize,
    /// Header columns that are not part of the schema (ignored)
    pub extra_columns: Vec<String>,
}

impl CsvSchema {
    /// Resolve column positions. Column order is free; every required
    /// column must be present by exact name.
    pub fn from_header(header: &StringRecord) -> Result<Self, SchemaError> {
        let names: Vec<&str> = header
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let name = if i == 0 {
                    name.trim_start_matches(UTF8_BOM)
                } else {
                    name
                };
                name.trim()
            })
            .collect();

        let position = |column: &str| names.iter().position(|name| *name == column);

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|column| position(column).is_none())
            .map(|column| column.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(SchemaError { missing });
        }

        let extra_columns = names
            .iter()
            .filter(|name| !REQUIRED_COLUMNS.contains(name))
            .map(|name| name.to_string())
            .collect();

        // All positions resolved above
        let at = |column: &str| position(column).unwrap_or_default();
        Ok(Self {
            sku: at(COL_SKU),
            name: at(COL_NAME),
            price: at(COL_PRICE),
            category: at(COL_CATEGORY),
            stock: at(COL_STOCK),
            image_url: at(COL_IMAGE_URL),
            width: names.len(),
            extra_columns,
        })
    }

    /// Parse a single header line (no trailing newline needed)
    pub fn from_header_line(line: &[u8]) -> Result<Self, SchemaError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(line);
        let mut record = StringRecord::new();
        match reader.read_record(&mut record) {
            Ok(true) => Self::from_header(&record),
            _ => Err(SchemaError {
                missing: REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            }),
        }
    }

    /// SKU cell of a record, trimmed (empty when the field is absent)
    pub fn sku_of<'r>(&self, record: &'r StringRecord) -> &'r str {
        record.get(self.sku).unwrap_or_default().trim()
    }

    /// Map a data record onto a validated Product. A record whose field
    /// count differs from the header is malformed as a whole.
    pub fn parse_record(&self, record: &StringRecord) -> Result<Product, InvalidRow> {
        if record.len() != self.width {
            return Err(InvalidRow {
                problems: vec![RowValidationError::MalformedRecord(format!(
                    "expected {} fields, found {}",
                    self.width,
                    record.len()
                ))],
            });
        }
        let field = |i: usize| record.get(i).unwrap_or_default();
        Product::parse(RawProduct {
            sku: field(self.sku),
            name: field(self.name),
            price: field(self.price),
            category: field(self.category),
            stock: field(self.stock),
            image_url: field(self.image_url),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_header() {
        let schema =
            CsvSchema::from_header_line(b"sku,name,price,category,stock,imageUrl").unwrap();
        assert!(schema.extra_columns.is_empty());
    }

    #[test]
    fn test_reordered_header_with_bom_and_extra_column() {
        let schema = CsvSchema::from_header_line(
            "\u{feff}name,sku,stock,price,imageUrl,category,notes".as_bytes(),
        )
        .unwrap();
        assert_eq!(schema.extra_columns, vec!["notes".to_string()]);

        let record = StringRecord::from(vec!["Rake", "R1", "3", "9.50", "", "tools", "x"]);
        let product = schema.parse_record(&record).unwrap();
        assert_eq!(product.sku, "R1");
        assert_eq!(product.name, "Rake");
        assert_eq!(product.stock, 3);
        assert_eq!(product.price.minor_units(), 950);
    }

    #[test]
    fn test_missing_columns_are_listed() {
        let err = CsvSchema::from_header_line(b"sku,name,price").unwrap_err();
        assert_eq!(err.missing, vec!["category", "stock", "imageUrl"]);
        assert!(err.to_string().contains("category,stock,imageUrl"));
    }

    #[test]
    fn test_column_names_are_case_sensitive() {
        let err = CsvSchema::from_header_line(b"sku,name,price,category,stock,imageurl")
            .unwrap_err();
        assert_eq!(err.missing, vec!["imageUrl"]);
    }

    #[test]
    fn test_wrong_field_count_is_malformed() {
        let schema =
            CsvSchema::from_header_line(b"sku,name,price,category,stock,imageUrl").unwrap();

        let short = StringRecord::from(vec!["A1", "Shovel", "19.99", "tools", "5"]);
        let invalid = schema.parse_record(&short).unwrap_err();
        assert_eq!(
            invalid.problems,
            vec![RowValidationError::MalformedRecord(
                "expected 6 fields, found 5".to_string()
            )]
        );
        assert_eq!(schema.sku_of(&short), "A1");

        let long =
            StringRecord::from(vec!["A2", "Rake", "1.00", "tools", "1", "https://x", "EXTRA"]);
        let invalid = schema.parse_record(&long).unwrap_err();
        assert_eq!(
            invalid.to_string(),
            "malformed record: expected 6 fields, found 7"
        );
    }

    #[test]
    fn test_extra_header_column_widens_records() {
        let schema =
            CsvSchema::from_header_line(b"sku,name,price,category,stock,imageUrl,notes").unwrap();
        let record = StringRecord::from(vec!["A1", "Shovel", "1.00", "tools", "5", "", "n"]);
        assert!(schema.parse_record(&record).is_ok());

        let record = StringRecord::from(vec!["A1", "Shovel", "1.00", "tools", "5", ""]);
        assert!(schema.parse_record(&record).is_err());
    }
}
