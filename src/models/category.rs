#[derive(Debug, Clone)]
pub struct Category {
    pub id: Option<i64>,
    pub name: String,
}

impl Category {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: Self::normalize_name(name),
        }
    }

    /// Trim and collapse inner whitespace so "  Eating   Out " and
    /// "Eating Out" resolve to the same category.
    pub fn normalize_name(name: &str) -> String {
        name.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
