/// One multiplicative step in a unit term.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Mul,
    Div,
}

/// A unit symbol, already split into its prefix and unit parts
/// (e.g. `mg` → prefix `m`, unit `g`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub prefix: Option<String>,
    pub unit: String,
    pub exponent: i32,
    pub annotation: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Component {
    Symbol(Symbol),
    /// A bare `{…}` annotation; semantically the unity unit.
    Annotation(String),
    /// An integer factor, possibly with an exponent (`10` in `mL/10`).
    Factor(u64, i32),
    /// A parenthesized sub-term with an optional exponent.
    Group(Box<Term>, i32),
}

/// A parsed unit expression: an ordered product/quotient of components.
/// The first component's op is `Mul` unless the expression opened with `/`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Term {
    pub components: Vec<(Op, Component)>,
}

impl Term {
    pub fn is_unity(&self) -> bool {
        self.components.is_empty()
            || self
                .components
                .iter()
                .all(|(_, c)| matches!(c, Component::Factor(1, _) | Component::Annotation(_)))
    }
}
