use std::fmt::Display;

use serde_repr::{Deserialize_repr, Serialize_repr};

/// A kind of caller, as asserted by the external authentication layer.
pub trait User {
    const RIGHTS: Rights;
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Rights {
    Student = 0,
    Admin = 1,
}

impl Display for Rights {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Student => "student",
                Self::Admin => "admin",
            }
        )
    }
}

/// A student who may cast ballots.
pub struct Student;

impl User for Student {
    const RIGHTS: Rights = Rights::Student;
}

/// An administrator who manages activities and the roster.
pub struct Admin;

impl User for Admin {
    const RIGHTS: Rights = Rights::Admin;
}
