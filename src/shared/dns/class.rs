/// Classes of the domain name system. Only the internet (IN) class
/// is supported in the project since other ones are unused/obsolete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Class {
    IN,
    CS,
    CH,
    HS,
}

impl Class {
    /// Try to generate a [`Class`] from its raw string representation.
    pub fn from_string(s: &str) -> Result<Self, &str> {
        match s {
            "IN" => Ok(Class::IN),
            "CS" => Ok(Class::CS),
            "CH" => Ok(Class::CH),
            "HS" => Ok(Class::HS),
            _ => Err(s),
        }
    }

    /// Determine if a [`Class`] is supported in the system.
    pub fn is_supported(&self) -> bool {
        match self {
            Class::IN => true,
            _ => false,
        }
    }
}
