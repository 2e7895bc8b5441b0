use serde::Serialize;

/// How a search field is compared in the WHERE clause.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Substring match with `LIKE`.
    Text,
    /// Operator comparison against `CONVERT(DATE, ...)`.
    Date,
}

/// An allow-listed field callers may select and filter on.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct SearchField {
    pub name: &'static str,
    pub db_field: &'static str,
    pub kind: FieldKind,
}

impl SearchField {
    const fn text(name: &'static str, db_field: &'static str) -> Self {
        Self {
            name,
            db_field,
            kind: FieldKind::Text,
        }
    }

    const fn date(name: &'static str, db_field: &'static str) -> Self {
        Self {
            name,
            db_field,
            kind: FieldKind::Date,
        }
    }

    #[must_use]
    pub const fn is_date(&self) -> bool {
        matches!(self.kind, FieldKind::Date)
    }

    /// Finds an allow-listed field by name, ignoring ASCII case.
    #[must_use]
    pub fn lookup(name: &str) -> Option<&'static Self> {
        let name = name.trim();
        SEARCH_FIELDS
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
    }
}

/// Searchable BR fields, in SELECT-list order.
pub static SEARCH_FIELDS: &[SearchField] = &[
    SearchField::text("BR_SHORT_TITLE", "br.BR_SHORT_TITLE"),
    SearchField::text("RPT_GC_ORG_NAME_EN", "br.RPT_GC_ORG_NAME_EN"),
    SearchField::text("RPT_GC_ORG_NAME_FR", "br.RPT_GC_ORG_NAME_FR"),
    SearchField::text("ORG_TYPE_EN", "br.ORG_TYPE_EN"),
    SearchField::text("ORG_TYPE_FR", "br.ORG_TYPE_FR"),
    SearchField::text("CLIENT_NAME_SRC", "br.CLIENT_NAME_SRC"),
    SearchField::text("CLIENT_REQST_NMBR", "br.CLIENT_REQST_NMBR"),
    SearchField::text("PRIORITY_EN", "br.PRIORITY_EN"),
    SearchField::text("PRIORITY_FR", "br.PRIORITY_FR"),
    SearchField::text("BR_TYPE_EN", "br.BR_TYPE_EN"),
    SearchField::text("BR_TYPE_FR", "br.BR_TYPE_FR"),
    SearchField::text("CPLX_EN", "br.CPLX_EN"),
    SearchField::text("CPLX_FR", "br.CPLX_FR"),
    SearchField::text("GROUP_EN", "br.GROUP_EN"),
    SearchField::text("GROUP_FR", "br.GROUP_FR"),
    SearchField::text("BR_STATUS_EN", "s.BR_STATUS_EN"),
    SearchField::text("BR_STATUS_FR", "s.BR_STATUS_FR"),
    SearchField::text("BR_ACTIVE_EN", "s.BR_ACTIVE_EN"),
    SearchField::text("PROD_DESC_EN", "products.PROD_DESC_EN"),
    SearchField::text("PROD_DESC_FR", "products.PROD_DESC_FR"),
    SearchField::text("ACC_MANAGER_OPI", "opis.ACC_MANAGER_OPI"),
    SearchField::text("AGR_OPI", "opis.AGR_OPI"),
    SearchField::text("BA_OPI", "opis.BA_OPI"),
    SearchField::text("BA_PRICING_OPI", "opis.BA_PRICING_OPI"),
    SearchField::text("BA_PRICING_TL", "opis.BA_PRICING_TL"),
    SearchField::text("BA_TL", "opis.BA_TL"),
    SearchField::text("CSM_DIRECTOR", "opis.CSM_DIRECTOR"),
    SearchField::text("EAOPI", "opis.EAOPI"),
    SearchField::text("PM_OPI", "opis.PM_OPI"),
    SearchField::text("PROD_OPI", "opis.PROD_OPI"),
    SearchField::text("QA_OPI", "opis.QA_OPI"),
    SearchField::text("SDM_TL_OPI", "opis.SDM_TL_OPI"),
    SearchField::text("SISDOPI", "opis.SISDOPI"),
    SearchField::text("BR_OWNER", "opis.BR_OWNER"),
    SearchField::text("TEAMLEADER", "opis.TEAMLEADER"),
    SearchField::text("WIO_OPI", "opis.WIO_OPI"),
    SearchField::date("SUBMIT_DATE", "br.SUBMIT_DATE"),
    SearchField::date("RVSD_TARGET_IMPL_DATE", "br.RVSD_TARGET_IMPL_DATE"),
    SearchField::date("CPLX_DATE", "br.CPLX_DATE"),
    SearchField::date("ACTUAL_IMPL_DATE", "br.ACTUAL_IMPL_DATE"),
    SearchField::date("AGRMT_END_DATE", "br.AGRMT_END_DATE"),
    SearchField::date("REQST_IMPL_DATE", "br.REQST_IMPL_DATE"),
    SearchField::date("CLOSED_DATE", "br.CLOSED_DATE"),
];
