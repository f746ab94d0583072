use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

/// A single label of a domain name. Labels are stored lowercased, so
/// equality and hashing are case-insensitive by construction. Besides
/// concrete labels (including the literal `*` of wildcard owners), a
/// label can be the symbolic α: it stands for any label that differs
/// from all the named sibling labels it carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Name(String),
    Alpha(BTreeSet<String>),
}

impl Label {
    /// Creates a concrete [`Label`], folding it to lowercase.
    pub fn named(s: &str) -> Self {
        Label::Name(s.to_lowercase())
    }

    /// Creates an α [`Label`] excluding the passed sibling labels.
    pub fn alpha<I: IntoIterator<Item = String>>(excluded: I) -> Self {
        Label::Alpha(excluded.into_iter().collect())
    }

    /// Reports if the [`Label`] is the literal wildcard label `*`.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Label::Name(s) if s == "*")
    }

    /// Reports if the [`Label`] is the symbolic α label.
    pub fn is_alpha(&self) -> bool {
        matches!(self, Label::Alpha(_))
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Label::Name(s) => f.write_str(s),
            Label::Alpha(_) => f.write_str("α"),
        }
    }
}

/// A wrapper for domain names. The [`Name`] struct holds valid absolute
/// domain names as a sequence of labels in top-down order (root first),
/// so ancestor and zone-containment tests are plain prefix tests on the
/// label vector. The empty sequence is the root. The string form is the
/// usual leaf-first, dot-terminated notation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Name {
    labels: Vec<Label>,
}

impl Name {
    /// Returns the root [`Name`] (the empty label sequence).
    pub fn root() -> Self {
        Name { labels: vec![] }
    }

    /// Creates a [`Name`] from the passed string. The string must be a
    /// valid absolute domain name. Labels are folded to lowercase.
    pub fn from_string(s: &str) -> Result<Self, NameErr> {
        validate_name(s)?;
        if s == "." {
            return Ok(Name::root());
        }
        let labels = s[..s.len() - 1]
            .split('.')
            .rev()
            .map(Label::named)
            .collect();
        Ok(Name { labels })
    }

    /// Creates a [`Name`] directly from top-down labels.
    pub fn from_labels(labels: Vec<Label>) -> Self {
        Name { labels }
    }

    /// The labels of the [`Name`], in top-down order.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// The number of labels in the [`Name`].
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// The leftmost (leaf) label, if any.
    pub fn leaf(&self) -> Option<&Label> {
        self.labels.last()
    }

    /// Returns a new [`Name`] with the passed label appended below the
    /// current one (that is, prepended in the display form).
    pub fn child(&self, label: Label) -> Self {
        let mut labels = self.labels.clone();
        labels.push(label);
        Name { labels }
    }

    /// Returns the [`Name`] with the leaf label removed, or `None` for
    /// the root.
    pub fn parent(&self) -> Option<Self> {
        if self.labels.is_empty() {
            return None;
        }
        let mut labels = self.labels.clone();
        labels.pop();
        Some(Name { labels })
    }

    /// Returns the ancestor made of the first `n` labels. `n` must not
    /// exceed the length of the [`Name`].
    pub fn ancestor(&self, n: usize) -> Self {
        assert!(n <= self.labels.len());
        Name {
            labels: self.labels[..n].to_vec(),
        }
    }
}

impl Name {
    /// Reports if the [`Name`] is owned by the top node of the passed zone.
    pub fn is_in_zone_root(&self, zone: &Self) -> bool {
        self == zone
    }

    /// Reports if the [`Name`] is contained in the passed zone, that is,
    /// the zone labels are a prefix of this name's labels.
    pub fn is_in_zone(&self, zone: &Self) -> bool {
        self.labels.len() >= zone.labels.len()
            && self.labels[..zone.labels.len()] == zone.labels[..]
    }

    /// Reports if the [`Name`] is a proper descendant of the passed name.
    pub fn is_below(&self, other: &Self) -> bool {
        self.labels.len() > other.labels.len() && self.is_in_zone(other)
    }

    /// Rewrites the `owner` suffix of this [`Name`] with `target`,
    /// keeping the label prefix below `owner` unchanged. This is the
    /// DNAME substitution: a query for `x.owner` becomes `x.target`.
    pub fn rewrite_suffix(&self, owner: &Self, target: &Self) -> Self {
        debug_assert!(self.is_in_zone(owner));
        let mut labels = target.labels.clone();
        labels.extend_from_slice(&self.labels[owner.labels.len()..]);
        Name { labels }
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            return f.write_str(".");
        }
        for label in self.labels.iter().rev() {
            write!(f, "{}.", label)?;
        }
        Ok(())
    }
}

// Validate the string to check if it's a valid (absolute) domain
// name. Both name and labels are validated.
fn validate_name(name: &str) -> Result<(), NameErr> {
    if name == "." {
        return Ok(());
    }
    if name.len() > 255 {
        return Err(NameErr::LongName);
    }
    if !name.ends_with('.') {
        return Err(NameErr::RelativeName);
    }
    if name.starts_with('.') {
        return Err(NameErr::MalformedName("starts with dot"));
    }
    if name.contains("..") {
        return Err(NameErr::MalformedName("double dot in name"));
    }
    let name = &name[..name.len() - 1];
    for label in name.split('.') {
        validate_label(label)?;
    }
    Ok(())
}

// Validate the label, checking both its length and the characters. The
// literal `*` of wildcard owners is allowed as a whole label, and so is
// the underscore (service owners such as `_sip._tcp`). Zone data in the
// wild is lax and the verifier must tolerate it, so validation stays lax.
fn validate_label(label: &str) -> Result<(), NameErr> {
    if label.is_empty() {
        return Err(NameErr::MalformedLabel("empty label"));
    }
    if label.len() > 63 {
        return Err(NameErr::LongLabel);
    }
    if label == "*" {
        return Ok(());
    }
    let valid = label
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if !valid {
        return Err(NameErr::MalformedLabel("invalid character"));
    }
    Ok(())
}

/// Errors returned by the [`Name`] creation and validation processes.
#[derive(Debug, Clone)]
pub enum NameErr {
    RelativeName,
    LongName,
    LongLabel,
    MalformedName(&'static str),
    MalformedLabel(&'static str),
}
