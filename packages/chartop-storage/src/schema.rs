pub fn render_schema() -> &'static str {
	include_str!("../../../sql/init.sql")
}

/// Splits the rendered schema into individual statements, dropping empty fragments.
pub fn statements(sql: &str) -> impl Iterator<Item = &str> {
	sql.split(';').map(str::trim).filter(|statement| !statement.is_empty())
}
