//! CSV export of the tables in a document tree.

use crate::error::{Result, SerializationError};
use quire_model::{DocumentTree, Row, Table};
use std::io::Write;

/// One exported table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableCsv {
    pub file_name: String,
    pub data: Vec<u8>,
}

impl TableCsv {
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

fn cells(row: &Row) -> impl Iterator<Item = String> + '_ {
    row.cells.iter().map(|c| c.text())
}

/// Writes the header (if any) and every body row of `table` as CSV records.
pub fn write_table_csv<W: Write>(table: &Table, writer: W) -> Result<W> {
    let mut csv = csv::Writer::from_writer(writer);
    if let Some(header) = &table.header {
        csv.write_record(cells(header))?;
    }
    for row in &table.rows {
        csv.write_record(cells(row))?;
    }
    csv.into_inner().map_err(|e| SerializationError::Io(e.into_error()))
}

/// Every table in document order, including tables nested in sections.
pub fn export_tables_csv(tree: &DocumentTree) -> Result<Vec<TableCsv>> {
    tree.tables()
        .into_iter()
        .enumerate()
        .map(|(index, table)| {
            Ok(TableCsv {
                file_name: format!("table-{}.csv", index + 1),
                data: write_table_csv(table, Vec::new())?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_model::{Column, DocumentMeta, PageSpec, Section, TextStyle};

    fn materials() -> Table {
        let style = TextStyle::default();
        Table::new(vec![Column::default(), Column::default(), Column::default()])
            .with_header(Row::from_texts(&["Item", "Qty", "Notes"], &style), true)
            .with_rows(vec![
                Row::from_texts(&["Cedar post", "12", "4x4, 8ft"], &style),
                Row::from_texts(&["Concrete", "24", "\"fast set\" bags"], &style),
            ])
    }

    #[test]
    fn quotes_fields_that_need_it() {
        let data = write_table_csv(&materials(), Vec::new()).unwrap();
        assert_eq!(
            String::from_utf8(data).unwrap(),
            "Item,Qty,Notes\nCedar post,12,\"4x4, 8ft\"\nConcrete,24,\"\"\"fast set\"\" bags\"\n"
        );
    }

    #[test]
    fn exports_nested_tables_in_order() {
        let mut tree = DocumentTree::new(DocumentMeta::default(), PageSpec::default());
        tree.push(materials());
        tree.push(Section { title: None, children: vec![materials().into()], hints: Default::default() });

        let exported = export_tables_csv(&tree).unwrap();
        let names: Vec<_> = exported.iter().map(|t| t.file_name.as_str()).collect();
        assert_eq!(names, vec!["table-1.csv", "table-2.csv"]);
        assert!(exported[1].as_str().unwrap().starts_with("Item,Qty,Notes\n"));
    }

    #[test]
    fn headerless_empty_table_exports_nothing() {
        let table = Table::new(vec![Column::default()]);
        assert!(write_table_csv(&table, Vec::new()).unwrap().is_empty());
    }
}
