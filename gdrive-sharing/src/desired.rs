use std::collections::BTreeSet;

use gdrive_core::Role;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("'{0}' cannot be granted to collaborators")]
pub struct UngrantableRole(&'static str);

/// Target sharing state for every object in scope. Fixed for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    collaborators: BTreeSet<String>,
    role: Role,
    pub disable_links: bool,
    pub take_ownership: bool,
    pub dry_run: bool,
}

impl DesiredState {
    pub fn new<I, T>(collaborators: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            collaborators: collaborators
                .into_iter()
                .map(|email| normalize_email(email.as_ref()))
                .filter(|email| !email.is_empty())
                .collect(),
            role: Role::Writer,
            disable_links: false,
            take_ownership: false,
            dry_run: false,
        }
    }

    /// Role given to added collaborators. Only reader, commenter and writer
    /// can be granted through a permission create.
    pub fn with_role(mut self, role: Role) -> Result<Self, UngrantableRole> {
        match role {
            Role::Reader | Role::Commenter | Role::Writer => {
                self.role = role;
                Ok(self)
            }
            Role::Owner | Role::Other => Err(UngrantableRole(role.as_str())),
        }
    }

    pub fn disable_links(mut self, disable: bool) -> Self {
        self.disable_links = disable;
        self
    }

    pub fn take_ownership(mut self, take: bool) -> Self {
        self.take_ownership = take;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn collaborators(&self) -> &BTreeSet<String> {
        &self.collaborators
    }

    pub fn wants(&self, email: &str) -> bool {
        self.collaborators.contains(&normalize_email(email))
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
