//! ISS table format: every block is `{"columns": [...], "data": [[...], ...]}`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::models::SecurityType;
use crate::provider::json;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssTable {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
}

impl IssTable {
    pub fn rows(&self) -> impl Iterator<Item = IssRow<'_>> {
        self.data
            .iter()
            .filter(|values| values.len() >= self.columns.len())
            .map(|values| IssRow {
                columns: &self.columns,
                values,
            })
    }

    pub fn first(&self) -> Option<IssRow<'_>> {
        self.rows().next()
    }
}

/// One row with case-insensitive column lookup.
#[derive(Debug, Clone, Copy)]
pub struct IssRow<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> IssRow<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|idx| self.values.get(idx))
    }

    pub fn string(&self, column: &str) -> Option<String> {
        self.get(column).and_then(json::string)
    }

    pub fn decimal(&self, column: &str) -> Option<Decimal> {
        self.get(column).and_then(json::decimal)
    }

    pub fn date(&self, column: &str) -> Option<NaiveDate> {
        self.get(column).and_then(json::date)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub securities: IssTable,
}

#[derive(Debug, Default, Deserialize)]
pub struct BoardResponse {
    #[serde(default)]
    pub securities: IssTable,
    #[serde(default)]
    pub marketdata: IssTable,
}

#[derive(Debug, Default, Deserialize)]
pub struct BondizationResponse {
    #[serde(default)]
    pub coupons: IssTable,
    #[serde(default)]
    pub amortizations: IssTable,
}

/// A row of `/securities.json` search output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub secid: String,
    pub shortname: String,
    pub name: String,
    pub isin: Option<String>,
    pub kind: Option<String>,
    pub group: Option<String>,
}

impl SearchHit {
    pub fn from_row(row: IssRow<'_>) -> Option<Self> {
        let secid = row.string("secid")?;
        Some(Self {
            secid,
            shortname: row.string("shortname").unwrap_or_default(),
            name: row.string("name").unwrap_or_default(),
            isin: row.string("isin"),
            kind: row.string("type"),
            group: row.string("group"),
        })
    }

    /// Classification from ISS `type` / `group` codes.
    pub fn security_type(&self) -> SecurityType {
        let code = self
            .kind
            .as_deref()
            .or(self.group.as_deref())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if code.contains("bond") {
            SecurityType::Bond
        } else if code.contains("ppif") || code.contains("etf") || code.contains("fund") {
            SecurityType::Fund
        } else {
            SecurityType::Share
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_BODY: &str = r#"{
        "securities": {
            "columns": ["id", "secid", "shortname", "regnumber", "name", "isin", "is_traded", "type", "group", "primary_boardid"],
            "data": [
                [1, "SBER", "Сбербанк", "10301481B", "Сбербанк России ПАО ао", "RU0009029540", 1, "common_share", "stock_shares", "TQBR"],
                [2, "RU000A100001", "ГазпромК1Р2", null, "Газпром капитал ООО БО-001Р-02", "RU000A100001", 1, "exchange_bond", "stock_bonds", "TQCB"],
                [3, "short"]
            ]
        }
    }"#;

    #[test]
    fn test_rows_skip_short_rows_and_lookup_is_case_insensitive() {
        let response: SearchResponse = serde_json::from_str(SEARCH_BODY).unwrap();
        let hits: Vec<SearchHit> = response
            .securities
            .rows()
            .filter_map(SearchHit::from_row)
            .collect();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].secid, "SBER");
        assert_eq!(hits[0].isin.as_deref(), Some("RU0009029540"));
        assert_eq!(hits[0].security_type(), SecurityType::Share);
        assert_eq!(hits[1].security_type(), SecurityType::Bond);

        let row = response.securities.first().unwrap();
        assert_eq!(row.string("SECID").as_deref(), Some("SBER"));
        assert!(row.get("REGNUMBER").is_some());
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn test_fund_classification() {
        let hit = SearchHit {
            secid: "TMOS".to_string(),
            shortname: "TMOS".to_string(),
            name: String::new(),
            isin: None,
            kind: Some("exchange_ppif".to_string()),
            group: None,
        };
        assert_eq!(hit.security_type(), SecurityType::Fund);
    }
}
