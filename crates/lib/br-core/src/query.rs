//! SELECT statement builder for business requests.
//!
//! The statement is assembled from fixed fragments plus numbered `@Pn`
//! placeholders. Placeholders are always issued in the order statuses,
//! BR numbers, filter values, row limit, which is also the order of the
//! parameter list produced by [`BrSearchRequest::build`].

use br_store::schema::{
    COLUMN_TOTAL_COUNT,
    PRODUCT_TYPE_LEAD,
    ROLE_COLUMNS,
    STATUS_ACTIVE,
    TABLE_BR_ITEMS,
    TABLE_BR_OPIS,
    TABLE_BR_PRODUCTS,
    TABLE_BR_SNAPSHOT,
    TABLE_PERSON,
    TABLE_PRODUCT,
    TABLE_STATUS,
};
use br_store::{BrQueryFilter, FilterError, QueryParam, SEARCH_FIELDS, SearchField};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// SQL Server rejects RPC calls with more parameters than this.
pub const MAX_QUERY_PARAMS: usize = 2100;

/// Shape of the statement produced by [`get_br_query`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BrQueryOptions<'a> {
    pub br_number_count: usize,
    pub status_count: usize,
    pub limit: bool,
    pub active: bool,
    pub filters: &'a [BrQueryFilter],
}

#[derive(Default)]
struct Placeholders {
    issued: usize,
}

impl Placeholders {
    fn next(&mut self) -> String {
        self.issued += 1;
        format!("@P{}", self.issued)
    }

    fn list(&mut self, count: usize) -> String {
        (0..count).map(|_| self.next()).collect::<Vec<_>>().join(", ")
    }
}

/// Builds the BR SELECT statement.
///
/// Filters naming a field outside the search allow-list are skipped and
/// consume no placeholder.
#[must_use]
pub fn get_br_query(options: &BrQueryOptions<'_>) -> String {
    let mut placeholders = Placeholders::default();

    let mut query = format!(
        "DECLARE @MAX_DATE DATETIME = (SELECT MAX(PERIOD_END_DATE) FROM {TABLE_BR_SNAPSHOT});\n\nWITH FilteredResults AS (\nSELECT\n    "
    );

    let mut columns = vec![
        "br.BR_NMBR AS BR_NMBR".to_string(),
        "br.EXTRACTION_DATE AS EXTRACTION_DATE".to_string(),
    ];
    columns.extend(
        SEARCH_FIELDS
            .iter()
            .map(|field| format!("{} AS {}", field.db_field, field.name)),
    );
    query.push_str(&columns.join(",\n    "));

    query.push_str(&format!("\nFROM\n    {TABLE_BR_ITEMS} br\n"));

    let mut snapshot_clause = vec!["snp.PERIOD_END_DATE = @MAX_DATE".to_string()];
    if options.status_count > 0 {
        snapshot_clause.push(format!(
            "snp.STATUS_ID IN ({})",
            placeholders.list(options.status_count)
        ));
    }
    query.push_str(&format!(
        "INNER JOIN\n    {TABLE_BR_SNAPSHOT} snp\nON snp.BR_NMBR = br.BR_NMBR AND {}\n",
        snapshot_clause.join(" AND ")
    ));

    query.push_str(&format!(
        "INNER JOIN\n    {TABLE_STATUS} s\nON s.STATUS_ID = snp.STATUS_ID\n"
    ));

    query.push_str(&role_pivot_join());

    query.push_str(&format!(
        "LEFT JOIN\n    {TABLE_BR_PRODUCTS} br_products WITH (FORCESEEK)\nON br_products.BR_NMBR = br.BR_NMBR AND br_products.PROD_TYPE = '{PRODUCT_TYPE_LEAD}'\nLEFT JOIN\n    {TABLE_PRODUCT} products WITH (NOLOCK)\nON products.PROD_ID = br_products.PROD_ID\n"
    ));

    let mut predicates = Vec::new();
    if options.active {
        predicates.push(format!("s.BR_ACTIVE_EN = '{STATUS_ACTIVE}'"));
    }
    if options.br_number_count > 0 {
        predicates.push(format!(
            "br.BR_NMBR IN ({})",
            placeholders.list(options.br_number_count)
        ));
    }
    for filter in options.filters {
        let Some(field) = SearchField::lookup(&filter.name) else {
            continue;
        };
        if field.is_date() {
            predicates.push(format!(
                "CONVERT(DATE, {}) {} {}",
                field.db_field,
                filter.operator.as_sql(),
                placeholders.next()
            ));
        } else {
            predicates.push(format!(
                "{} LIKE {} ESCAPE '\\'",
                field.db_field,
                placeholders.next()
            ));
        }
    }
    if !predicates.is_empty() {
        query.push_str("WHERE ");
        query.push_str(&predicates.join("\n    AND "));
        query.push('\n');
    }

    let top = if options.limit {
        format!("TOP({}) ", placeholders.next())
    } else {
        String::new()
    };
    query.push_str(&format!(
        ")\nSELECT {top}*,\n    COUNT(*) OVER() AS {COLUMN_TOTAL_COUNT}\nFROM FilteredResults\nORDER BY\n    BR_NMBR DESC\nOPTION (RECOMPILE, OPTIMIZE FOR (@MAX_DATE UNKNOWN));\n"
    ));

    query
}

fn role_pivot_join() -> String {
    let selected = ROLE_COLUMNS
        .iter()
        .map(|(role, column)| {
            if role == column {
                (*role).to_string()
            } else {
                format!("{role} AS {column}")
            }
        })
        .collect::<Vec<_>>()
        .join(",\n        ");
    let pivoted = ROLE_COLUMNS
        .iter()
        .map(|(role, _)| *role)
        .collect::<Vec<_>>()
        .join(",\n            ");

    format!(
        "LEFT JOIN\n    (SELECT\n        BR_NMBR,\n        {selected}\n    FROM\n    (\n        SELECT opis.BR_NMBR, opis.BUS_OPI_ID, person.FULL_NAME\n        FROM {TABLE_BR_OPIS} opis\n        INNER JOIN {TABLE_PERSON} person\n        ON opis.PERSON_ID = person.PERSON_ID\n    ) AS SourceTable\n    PIVOT\n    (\n        MAX(FULL_NAME)\n        FOR BUS_OPI_ID IN (\n            {pivoted}\n        )\n    ) AS PivotTable\n) AS opis\nON opis.BR_NMBR = br.BR_NMBR\n"
    )
}

/// Search request accepted by the control plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrSearchRequest {
    #[serde(default)]
    pub br_numbers: Vec<i64>,
    #[serde(default)]
    pub statuses: Vec<i64>,
    #[serde(default)]
    pub filters: Vec<BrQueryFilter>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub active: bool,
}

/// SQL text with the parameters bound to its placeholders, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<QueryParam>,
    pub dropped_filters: Vec<String>,
}

impl BrSearchRequest {
    /// Row cap actually applied; zero means no cap.
    #[must_use]
    pub fn effective_limit(&self) -> Option<u32> {
        self.limit.filter(|limit| *limit > 0)
    }

    /// Builds the statement and its aligned parameter list.
    ///
    /// # Errors
    /// Returns `FilterError` if a date filter value is not a valid date or the
    /// request needs more than [`MAX_QUERY_PARAMS`] parameters.
    pub fn build(&self) -> Result<BuiltQuery, FilterError> {
        let limit = self.effective_limit();
        let mut params = Vec::with_capacity(
            self.statuses.len() + self.br_numbers.len() + self.filters.len() + 1,
        );
        params.extend(self.statuses.iter().copied().map(QueryParam::Int));
        params.extend(self.br_numbers.iter().copied().map(QueryParam::Int));

        let mut dropped_filters = Vec::new();
        for filter in &self.filters {
            let Some(field) = SearchField::lookup(&filter.name) else {
                debug!(field = %filter.name, "dropping filter on unknown search field");
                dropped_filters.push(filter.name.clone());
                continue;
            };
            let param = if field.is_date() {
                QueryParam::date(field.name, &filter.value)?
            } else {
                QueryParam::contains(&filter.value)
            };
            params.push(param);
        }

        if let Some(limit) = limit {
            params.push(QueryParam::Int(i64::from(limit)));
        }
        if params.len() > MAX_QUERY_PARAMS {
            return Err(FilterError::TooManyParameters {
                count: params.len(),
                max: MAX_QUERY_PARAMS,
            });
        }

        let sql = get_br_query(&BrQueryOptions {
            br_number_count: self.br_numbers.len(),
            status_count: self.statuses.len(),
            limit: limit.is_some(),
            active: self.active,
            filters: &self.filters,
        });

        Ok(BuiltQuery {
            sql,
            params,
            dropped_filters,
        })
    }
}

#[cfg(test)]
mod tests {
    use br_store::FilterOperator;

    use super::*;

    fn placeholder_positions(sql: &str) -> Vec<usize> {
        let mut found = Vec::new();
        let mut rest = sql;
        while let Some(index) = rest.find("@P") {
            let tail = &rest[index + 2..];
            let digits: String = tail.chars().take_while(char::is_ascii_digit).collect();
            if let Ok(number) = digits.parse() {
                found.push(number);
            }
            rest = tail;
        }
        found
    }

    #[test]
    fn pivot_renames_request_owner() {
        let sql = get_br_query(&BrQueryOptions::default());
        assert!(sql.contains("SR_OWNER AS BR_OWNER"));
        assert!(sql.contains("FOR BUS_OPI_ID IN ("));
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn placeholders_follow_parameter_order() {
        let request = BrSearchRequest {
            br_numbers: vec![101, 102],
            statuses: vec![3],
            filters: vec![
                BrQueryFilter::new("SUBMIT_DATE", FilterOperator::Ge, "2024-01-01"),
                BrQueryFilter::new("BR_SHORT_TITLE", FilterOperator::Eq, "portal"),
            ],
            limit: Some(25),
            active: true,
        };
        let built = request.build().expect("request should build");

        assert_eq!(placeholder_positions(&built.sql), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(built.params.len(), 6);
        assert_eq!(built.params[0], QueryParam::Int(3));
        assert_eq!(built.params[1], QueryParam::Int(101));
        assert_eq!(built.params[4], QueryParam::Text("%portal%".to_string()));
        assert_eq!(built.params[5], QueryParam::Int(25));
        assert!(built.sql.contains("snp.STATUS_ID IN (@P1)"));
        assert!(built.sql.contains("br.BR_NMBR IN (@P2, @P3)"));
        assert!(built.sql.contains("CONVERT(DATE, br.SUBMIT_DATE) >= @P4"));
        assert!(built.sql.contains("br.BR_SHORT_TITLE LIKE @P5"));
        assert!(built.sql.contains("SELECT TOP(@P6) *"));
    }

    #[test]
    fn text_filters_match_metacharacters_literally() {
        let request = BrSearchRequest {
            filters: vec![
                BrQueryFilter::new("BR_SHORT_TITLE", FilterOperator::Eq, "[DRAFT]"),
                BrQueryFilter::new("CLIENT_REQST_NMBR", FilterOperator::Eq, "100%_A"),
            ],
            ..BrSearchRequest::default()
        };
        let built = request.build().expect("request should build");

        assert!(built.sql.contains(r"br.BR_SHORT_TITLE LIKE @P1 ESCAPE '\'"));
        assert_eq!(
            built.params,
            vec![
                QueryParam::Text(r"%\[DRAFT]%".to_string()),
                QueryParam::Text(r"%100\%\_A%".to_string()),
            ]
        );
    }

    #[test]
    fn parameter_count_is_capped() {
        let request = BrSearchRequest {
            br_numbers: (1..=2100).collect(),
            limit: Some(10),
            ..BrSearchRequest::default()
        };
        assert_eq!(
            request.build(),
            Err(FilterError::TooManyParameters {
                count: 2101,
                max: MAX_QUERY_PARAMS,
            })
        );

        let request = BrSearchRequest {
            br_numbers: (1..=2100).collect(),
            ..BrSearchRequest::default()
        };
        assert!(request.build().is_ok());
    }

    #[test]
    fn zero_limit_means_uncapped() {
        let request = BrSearchRequest {
            limit: Some(0),
            ..BrSearchRequest::default()
        };
        let built = request.build().expect("request should build");
        assert!(built.params.is_empty());
        assert!(!built.sql.contains("TOP("));
    }

    #[test]
    fn invalid_date_value_fails_build() {
        let request = BrSearchRequest {
            filters: vec![BrQueryFilter::new("CLOSED_DATE", FilterOperator::Lt, "yesterday")],
            ..BrSearchRequest::default()
        };
        assert!(matches!(
            request.build(),
            Err(FilterError::InvalidDate { .. })
        ));
    }
}
