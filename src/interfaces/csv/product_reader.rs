use crate::domain::catalog::Product;
use crate::error::{PaymentError, Result};
use std::io::Read;

/// Reads the fabric catalog from a CSV source with columns
/// `id, name, unit_price, stock`.
///
/// Whitespace around fields is trimmed and short rows are tolerated by the
/// underlying reader; a row that does not deserialize yields an `Err` item.
pub struct ProductReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ProductReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes products, one per row.
    pub fn products(self) -> impl Iterator<Item = Result<Product>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
