pub const DB_SCHEMA: &str = "[EDR_CARZ]";

pub const TABLE_BR_ITEMS: &str = "[EDR_CARZ].[DIM_DEMAND_BR_ITEMS]";
pub const TABLE_BR_SNAPSHOT: &str = "[EDR_CARZ].[FCT_DEMAND_BR_SNAPSHOT]";
pub const TABLE_STATUS: &str = "[EDR_CARZ].[DIM_BITS_STATUS]";
pub const TABLE_BR_OPIS: &str = "[EDR_CARZ].[FCT_DEMAND_BR_OPIS]";
pub const TABLE_PERSON: &str = "[EDR_CARZ].[DIM_BITS_PERSON]";
pub const TABLE_BR_PRODUCTS: &str = "[EDR_CARZ].[FCT_DEMAND_BR_PRODUCTS]";
pub const TABLE_PRODUCT: &str = "[EDR_CARZ].[DIM_BITS_PRODUCT]";

/// Value of `s.BR_ACTIVE_EN` for active requests.
pub const STATUS_ACTIVE: &str = "Active";

/// Product type kept by the lead-product join.
pub const PRODUCT_TYPE_LEAD: &str = "LEAD";

/// Column carrying the window count over the filtered rows.
pub const COLUMN_TOTAL_COUNT: &str = "TotalCount";

/// Role identifiers pivoted from `FCT_DEMAND_BR_OPIS.BUS_OPI_ID` into columns.
///
/// Each entry is `(role id, output column)`; only `SR_OWNER` is renamed.
pub const ROLE_COLUMNS: &[(&str, &str)] = &[
    ("ACC_MANAGER_OPI", "ACC_MANAGER_OPI"),
    ("AGR_OPI", "AGR_OPI"),
    ("BA_OPI", "BA_OPI"),
    ("BA_PRICING_OPI", "BA_PRICING_OPI"),
    ("BA_PRICING_TL", "BA_PRICING_TL"),
    ("BA_TL", "BA_TL"),
    ("CSM_DIRECTOR", "CSM_DIRECTOR"),
    ("EAOPI", "EAOPI"),
    ("PM_OPI", "PM_OPI"),
    ("PROD_OPI", "PROD_OPI"),
    ("QA_OPI", "QA_OPI"),
    ("SDM_TL_OPI", "SDM_TL_OPI"),
    ("SISDOPI", "SISDOPI"),
    ("SR_OWNER", "BR_OWNER"),
    ("TEAMLEADER", "TEAMLEADER"),
    ("WIO_OPI", "WIO_OPI"),
];

/// Lookup statement for the status dimension.
pub const STATUS_LOOKUP_QUERY: &str = "SELECT STATUS_ID, BR_STATUS_EN, BR_STATUS_FR, BR_ACTIVE_EN FROM [EDR_CARZ].[DIM_BITS_STATUS] ORDER BY STATUS_ID;";
