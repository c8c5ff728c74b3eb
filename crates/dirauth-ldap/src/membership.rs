//! Transitive group membership resolution
//!
//! Walks the "is member of" relation breadth first from a root entry. Each
//! discovered group is queued exactly once, so cycles in the group graph
//! cannot cause repeated work or non-termination.

use crate::directory::{DirectorySession, Filter};
use dirauth_core::{Error, Result};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, error};

/// Resolves nested group memberships below a group base
#[derive(Debug, Clone)]
pub struct MembershipResolver {
    group_base_dn: String,
    membership_attribute: String,
}

impl MembershipResolver {
    pub fn new(group_base_dn: impl Into<String>, membership_attribute: impl Into<String>) -> Self {
        Self {
            group_base_dn: group_base_dn.into(),
            membership_attribute: membership_attribute.into(),
        }
    }

    pub fn group_base_dn(&self) -> &str {
        &self.group_base_dn
    }

    /// All groups `root_dn` belongs to, directly or through nesting, in
    /// discovery order. Never contains `root_dn` itself.
    ///
    /// Issues one subtree search per distinct group reached.
    pub async fn resolve<S>(&self, session: &mut S, root_dn: &str) -> Result<Vec<String>>
    where
        S: DirectorySession + ?Sized,
    {
        let mut visited = HashSet::from([root_dn.to_string()]);
        let mut memberships = Vec::new();
        let mut queue = VecDeque::from([root_dn.to_string()]);

        while let Some(node) = queue.pop_front() {
            let filter = Filter::equality(&self.membership_attribute, node.as_str());
            let groups = session
                .search(&self.group_base_dn, &filter)
                .await
                .map_err(|fault| {
                    error!(
                        base = %self.group_base_dn,
                        filter = %filter,
                        error = %fault,
                        "Membership search failed"
                    );
                    Error::DirectoryProtocol {
                        operation: format!("membership search for {}", node),
                        detail: fault.to_string(),
                    }
                })?;

            debug!(dn = %node, count = groups.len(), "Memberships found");

            for group in groups {
                if visited.insert(group.dn.clone()) {
                    debug!(member = %node, group = %group.dn, "Discovered membership");
                    memberships.push(group.dn.clone());
                    queue.push_back(group.dn);
                }
            }
        }

        Ok(memberships)
    }
}
