// Product Domain Model (owned by the Catalog Repository)

use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Business key of a product
pub type Sku = String;

/// Fractional digits carried by a price
pub const PRICE_SCALE: u32 = 2;

/// Non-negative decimal price held as integer minor units (cents)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(i64);

impl Price {
    pub fn from_minor_units(minor: i64) -> Self {
        Self(minor)
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = 10_i64.pow(PRICE_SCALE);
        write!(
            f,
            "{}.{:0width$}",
            self.0 / unit,
            self.0 % unit,
            width = PRICE_SCALE as usize
        )
    }
}

impl FromStr for Price {
    type Err = DomainError;

    /// Parses `19.99`, `5`, `0.5`. Signs, exponents and more than two
    /// fractional digits are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::InvalidPrice(s.to_string());

        let (whole, fraction) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if fraction.len() > PRICE_SCALE as usize {
            return Err(invalid());
        }
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(whole) || !all_digits(fraction) {
            return Err(invalid());
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut fraction_minor: i64 = if fraction.is_empty() {
            0
        } else {
            fraction.parse().map_err(|_| invalid())?
        };
        for _ in fraction.len()..PRICE_SCALE as usize {
            fraction_minor *= 10;
        }

        whole
            .checked_mul(10_i64.pow(PRICE_SCALE))
            .and_then(|minor| minor.checked_add(fraction_minor))
            .map(Price)
            .ok_or_else(invalid)
    }
}

/// A catalog product as parsed from one CSV row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub sku: Sku,
    pub name: String,
    pub price: Price,
    pub category: String,
    pub stock: i64,
    pub image_url: String,
}

/// Why a single row was rejected. Never escalates past the row.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowValidationError {
    #[error("sku is empty")]
    EmptySku,

    #[error("price '{0}' is negative")]
    NegativePrice(String),

    #[error("price '{0}' is not a decimal with at most 2 fractional digits")]
    MalformedPrice(String),

    #[error("stock '{0}' is negative")]
    NegativeStock(String),

    #[error("stock '{0}' is not an integer")]
    MalformedStock(String),

    #[error("malformed record: {0}")]
    MalformedRecord(String),
}

/// All problems found on one row, reported together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRow {
    pub problems: Vec<RowValidationError>,
}

impl fmt::Display for InvalidRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.problems.iter().map(|p| p.to_string()).collect();
        f.write_str(&parts.join("; "))
    }
}

/// Raw, untrimmed field values of one data row
#[derive(Debug, Clone, Copy)]
pub struct RawProduct<'a> {
    pub sku: &'a str,
    pub name: &'a str,
    pub price: &'a str,
    pub category: &'a str,
    pub stock: &'a str,
    pub image_url: &'a str,
}

impl Product {
    /// Validate raw fields: non-empty sku, price >= 0, stock >= 0
    pub fn parse(raw: RawProduct<'_>) -> Result<Product, InvalidRow> {
        let mut problems = Vec::new();

        let sku = raw.sku.trim();
        if sku.is_empty() {
            problems.push(RowValidationError::EmptySku);
        }

        let price_text = raw.price.trim();
        let price = if let Some(rest) = price_text.strip_prefix('-') {
            if rest.parse::<Price>().is_ok() {
                problems.push(RowValidationError::NegativePrice(price_text.to_string()));
            } else {
                problems.push(RowValidationError::MalformedPrice(price_text.to_string()));
            }
            None
        } else {
            match price_text.parse::<Price>() {
                Ok(price) => Some(price),
                Err(_) => {
                    problems.push(RowValidationError::MalformedPrice(price_text.to_string()));
                    None
                }
            }
        };

        let stock_text = raw.stock.trim();
        let stock = match stock_text.parse::<i64>() {
            Ok(stock) if stock < 0 => {
                problems.push(RowValidationError::NegativeStock(stock_text.to_string()));
                None
            }
            Ok(stock) => Some(stock),
            Err(_) => {
                problems.push(RowValidationError::MalformedStock(stock_text.to_string()));
                None
            }
        };

        match (price, stock) {
            (Some(price), Some(stock)) if problems.is_empty() => Ok(Product {
                sku: sku.to_string(),
                name: raw.name.trim().to_string(),
                price,
                category: raw.category.trim().to_string(),
                stock,
                image_url: raw.image_url.trim().to_string(),
            }),
            _ => Err(InvalidRow { problems }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw<'a>(sku: &'a str, price: &'a str, stock: &'a str) -> RawProduct<'a> {
        RawProduct {
            sku,
            name: "Shovel",
            price,
            category: "tools",
            stock,
            image_url: "https://x/img.jpg",
        }
    }

    #[test]
    fn test_price_parsing() {
        assert_eq!("19.99".parse::<Price>().unwrap().minor_units(), 1999);
        assert_eq!("5".parse::<Price>().unwrap().minor_units(), 500);
        assert_eq!("0.5".parse::<Price>().unwrap().minor_units(), 50);
        assert_eq!(".75".parse::<Price>().unwrap().minor_units(), 75);
        assert_eq!("0".parse::<Price>().unwrap().minor_units(), 0);

        assert!("abc".parse::<Price>().is_err());
        assert!("1.999".parse::<Price>().is_err());
        assert!("1e3".parse::<Price>().is_err());
        assert!("".parse::<Price>().is_err());
        assert!(".".parse::<Price>().is_err());
        assert!("99999999999999999999".parse::<Price>().is_err());
    }

    #[test]
    fn test_price_display() {
        assert_eq!(Price::from_minor_units(1999).to_string(), "19.99");
        assert_eq!(Price::from_minor_units(5).to_string(), "0.05");
        assert_eq!(Price::from_minor_units(500).to_string(), "5.00");
    }

    #[test]
    fn test_valid_row_is_trimmed() {
        let product = Product::parse(raw(" A1 ", " 19.99", "5 ")).unwrap();
        assert_eq!(product.sku, "A1");
        assert_eq!(product.price.minor_units(), 1999);
        assert_eq!(product.stock, 5);
    }

    #[test]
    fn test_invalid_row_reports_every_problem() {
        let invalid = Product::parse(raw("", "abc", "-1")).unwrap_err();
        assert_eq!(
            invalid.problems,
            vec![
                RowValidationError::EmptySku,
                RowValidationError::MalformedPrice("abc".to_string()),
                RowValidationError::NegativeStock("-1".to_string()),
            ]
        );
        assert_eq!(
            invalid.to_string(),
            "sku is empty; price 'abc' is not a decimal with at most 2 fractional digits; stock '-1' is negative"
        );
    }

    #[test]
    fn test_negative_price_is_distinguished() {
        let invalid = Product::parse(raw("A1", "-2.50", "1")).unwrap_err();
        assert_eq!(
            invalid.problems,
            vec![RowValidationError::NegativePrice("-2.50".to_string())]
        );
    }

    #[test]
    fn test_zero_price_and_stock_are_valid() {
        let product = Product::parse(raw("FREE", "0.00", "0")).unwrap();
        assert_eq!(product.price.minor_units(), 0);
        assert_eq!(product.stock, 0);
    }
}
