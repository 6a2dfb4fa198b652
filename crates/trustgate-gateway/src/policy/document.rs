//! Policy file schema and compilation into an immutable `PolicySet`.
//!
//! ```yaml
//! groups:
//!   operators: [alice, bob]
//! policies:
//!   - resource_group: wsw-rpc
//!     resource: "^admin\\."
//!     groups: [operators]
//!     keys: ["tscp1:risk"]
//!     policy: |
//!       local risk = scores["tscp1:risk"]
//!       risk ~= nil and risk < 0.5
//! ```
//!
//! `resource` is a regex matched at the start of the resource only (prefix
//! semantics): `^foo` and `foo` both accept `foobar`.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use regex::Regex;
use serde::Deserialize;

use trustgate_core::error::{Result, TrustGateError};

use crate::script::{CompiledScript, ScriptRuntime};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDocument {
    /// group -> members. Members may be written as numbers; they are
    /// canonicalized to strings.
    pub groups: BTreeMap<String, Vec<serde_yaml::Value>>,
    pub policies: Vec<PolicyEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyEntry {
    pub resource_group: String,
    pub resource: String,
    pub groups: Vec<String>,
    #[serde(default)]
    pub keys: Vec<String>,
    pub policy: String,
}

/// One compiled rule.
#[derive(Debug)]
pub struct Policy {
    name: String,
    resource_group: String,
    pattern: Regex,
    pattern_text: String,
    allowed_groups: BTreeSet<String>,
    required_keys: Vec<String>,
    predicate: CompiledScript,
}

impl Policy {
    pub fn compile(entry: &PolicyEntry, runtime: &ScriptRuntime) -> Result<Self> {
        let name = format!("{}:{}", entry.resource_group, entry.resource);
        let pattern = Regex::new(&format!("^(?:{})", entry.resource)).map_err(|e| {
            TrustGateError::Config(format!("policy {name}: invalid resource pattern: {e}"))
        })?;
        let predicate = runtime
            .compile(&name, &entry.policy)
            .map_err(|e| TrustGateError::Config(format!("policy {name}: {e}")))?;

        Ok(Self {
            name,
            resource_group: entry.resource_group.clone(),
            pattern,
            pattern_text: entry.resource.clone(),
            allowed_groups: entry.groups.iter().cloned().collect(),
            required_keys: entry.keys.clone(),
            predicate,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    pub fn pattern_text(&self) -> &str {
        &self.pattern_text
    }

    pub fn allowed_groups(&self) -> &BTreeSet<String> {
        &self.allowed_groups
    }

    pub fn required_keys(&self) -> &[String] {
        &self.required_keys
    }

    pub fn predicate(&self) -> &CompiledScript {
        &self.predicate
    }

    /// Resource pattern matches at position 0; the end is unanchored.
    pub fn matches_resource(&self, resource: &str) -> bool {
        self.pattern.is_match(resource)
    }

    pub fn applies_to(&self, resource_group: &str, resource: &str, groups: &BTreeSet<String>) -> bool {
        self.resource_group == resource_group
            && self.matches_resource(resource)
            && !self.allowed_groups.is_disjoint(groups)
    }
}

/// One configuration generation: ordered policies plus both membership maps.
#[derive(Debug, Default)]
pub struct PolicySet {
    generation: u64,
    policies: Vec<Policy>,
    members: HashMap<String, BTreeSet<String>>,
    memberships: HashMap<String, BTreeSet<String>>,
}

impl PolicySet {
    /// Generation 0: no groups, no policies, everything denied.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn parse(text: &str, runtime: &ScriptRuntime) -> Result<Self> {
        let doc: PolicyDocument = serde_yaml::from_str(text)
            .map_err(|e| TrustGateError::Config(format!("invalid policy yaml: {e}")))?;
        Self::compile(&doc, runtime)
    }

    pub fn compile(doc: &PolicyDocument, runtime: &ScriptRuntime) -> Result<Self> {
        let mut members: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut memberships: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (group, users) in &doc.groups {
            let set = members.entry(group.clone()).or_default();
            for user in users {
                let user = scalar_to_string(user).ok_or_else(|| {
                    TrustGateError::Config(format!("group {group}: members must be scalars"))
                })?;
                set.insert(user.clone());
                memberships.entry(user).or_default().insert(group.clone());
            }
        }

        let policies = doc
            .policies
            .iter()
            .map(|p| Policy::compile(p, runtime))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            generation: 0,
            policies,
            members,
            memberships,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn members_of(&self, group: &str) -> Option<&BTreeSet<String>> {
        self.members.get(group)
    }

    /// `None` for users outside every group.
    pub fn groups_of(&self, user: &str) -> Option<&BTreeSet<String>> {
        self.memberships.get(user).filter(|g| !g.is_empty())
    }

    /// First policy, in file order, that applies to the request.
    pub fn select(&self, resource_group: &str, resource: &str, groups: &BTreeSet<String>) -> Option<&Policy> {
        self.policies
            .iter()
            .find(|p| p.applies_to(resource_group, resource, groups))
    }
}

fn scalar_to_string(v: &serde_yaml::Value) -> Option<String> {
    match v {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
