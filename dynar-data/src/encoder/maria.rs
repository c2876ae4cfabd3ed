use super::DynamicEncoder;
use crate::value::Verbatim;

/// MariaDB dynamic columns (`COLUMN_CREATE` / `COLUMN_GET` / `COLUMN_JSON`).
#[derive(Debug, Clone, Copy, Default)]
pub struct MariaEncoder;

impl DynamicEncoder for MariaEncoder {
    fn name(&self) -> &'static str {
        "mariadb"
    }

    fn quote_column(&self, column: &str) -> String {
        format!("`{}`", column.replace('`', "``"))
    }

    fn accessor_step(&self, inner: &str, key: &str, sql_type: &str, _last: bool) -> String {
        format!("COLUMN_GET({inner}, {key} AS {sql_type})")
    }

    fn build_call(&self, args: &[String]) -> String {
        format!("COLUMN_CREATE({})", args.join(", "))
    }

    fn verbatim(&self, value: &Verbatim) -> String {
        match &value.sql_type {
            Some(t) => format!("{} AS {t}", value.sql),
            None => value.sql.clone(),
        }
    }

    fn read_expression(&self, column: &str) -> String {
        format!("COLUMN_JSON({column})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessor_and_build() {
        let enc = MariaEncoder;
        let col = enc.quote_column("details");
        assert_eq!(col, "`details`");
        let inner = enc.accessor_step(&col, ":p1", "CHAR", false);
        let outer = enc.accessor_step(&inner, ":p2", "INT", true);
        assert_eq!(outer, "COLUMN_GET(COLUMN_GET(`details`, :p1 AS CHAR), :p2 AS INT)");
        assert_eq!(
            enc.build_call(&[":k".into(), ":v".into()]),
            "COLUMN_CREATE(:k, :v)"
        );
        assert_eq!(enc.read_expression(&col), "COLUMN_JSON(`details`)");
    }

    #[test]
    fn test_verbatim() {
        let enc = MariaEncoder;
        assert_eq!(enc.verbatim(&Verbatim::typed("4.99", "DECIMAL(6,2)")), "4.99 AS DECIMAL(6,2)");
        assert_eq!(enc.verbatim(&Verbatim::new("NOW()")), "NOW()");
    }
}
