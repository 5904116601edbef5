use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Tabled)]
pub struct EntryRow {
    #[tabled(rename = "Entity")]
    pub entity: String,
    #[tabled(rename = "Expire")]
    pub expire: String,
    #[tabled(rename = "Document")]
    pub document: String,
}

#[derive(Default)]
pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

pub fn stats_table(stats: &[(&str, String)]) -> String {
    let mut builder = TableBuilder::new();
    for (label, value) in stats {
        builder.add_row(label, value);
    }
    builder.build()
}

pub fn entries_table(rows: Vec<EntryRow>) -> String {
    if rows.is_empty() {
        return String::new();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_is_blank() {
        assert!(TableBuilder::new().build().is_empty());
        assert!(entries_table(Vec::new()).is_empty());
    }

    #[test]
    fn test_stats_table_contains_rows() {
        let table = stats_table(&[("Sets", "2".to_string()), ("Records", "7".to_string())]);
        assert!(table.contains("Metric"));
        assert!(table.contains("Records"));
        assert!(table.contains('7'));
    }
}
