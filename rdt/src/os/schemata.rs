/*
 * Copyright 2024 Fluence Labs Limited
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::collections::BTreeMap;
use std::fmt;

/// Memory bandwidth values are decimal percents, cache masks are hexadecimal.
const MBA_RESOURCE: &str = "MB";

/// Content of a resctrl `schemata` file, one line per resource:
/// `L3:0=7ff;1=7ff`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(super) struct Schemata {
    resources: Vec<(String, BTreeMap<u32, u64>)>,
}

impl Schemata {
    /// Returns None if a line doesn't look like `RESOURCE:domain=value;...`.
    pub(super) fn parse(content: &str) -> Option<Self> {
        let mut resources = Vec::new();
        for line in content.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let (resource, domains) = line.split_once(':')?;
            let resource = resource.trim();
            let radix = radix_of(resource);

            let mut values = BTreeMap::new();
            for domain in domains
                .split(';')
                .map(str::trim)
                .filter(|domain| !domain.is_empty())
            {
                let (domain_id, value) = domain.split_once('=')?;
                let domain_id = domain_id.trim().parse().ok()?;
                let value = u64::from_str_radix(value.trim(), radix).ok()?;
                values.insert(domain_id, value);
            }
            resources.push((resource.to_string(), values));
        }

        Some(Self { resources })
    }

    pub(super) fn get(&self, resource: &str, domain_id: u32) -> Option<u64> {
        self.resources
            .iter()
            .find(|(name, _)| name == resource)
            .and_then(|(_, domains)| domains.get(&domain_id).copied())
    }

    pub(super) fn set(&mut self, resource: &str, domain_id: u32, value: u64) {
        match self.resources.iter_mut().find(|(name, _)| name == resource) {
            Some((_, domains)) => {
                domains.insert(domain_id, value);
            }
            None => self
                .resources
                .push((resource.to_string(), BTreeMap::from([(domain_id, value)]))),
        }
    }

    /// Overwrites every domain of the resource, does nothing if the resource is absent.
    pub(super) fn set_all(&mut self, resource: &str, value: u64) {
        if let Some((_, domains)) = self.resources.iter_mut().find(|(name, _)| name == resource) {
            domains.values_mut().for_each(|domain_value| *domain_value = value);
        }
    }
}

impl fmt::Display for Schemata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (resource, domains) in &self.resources {
            write!(f, "{resource}:")?;
            for (idx, (domain_id, value)) in domains.iter().enumerate() {
                if idx > 0 {
                    write!(f, ";")?;
                }
                if radix_of(resource) == 10 {
                    write!(f, "{domain_id}={value}")?;
                } else {
                    write!(f, "{domain_id}={value:x}")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn radix_of(resource: &str) -> u32 {
    if resource == MBA_RESOURCE {
        10
    } else {
        16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_output_is_parsed() {
        let content = "    L3:0=7ff;1=0f0\n    MB:0=100;1= 50\n";

        let schemata = Schemata::parse(content).unwrap();

        assert_eq!(schemata.get("L3", 1), Some(0xF0));
        assert_eq!(schemata.get("MB", 1), Some(50));
        assert_eq!(schemata.get("L2", 0), None);
        assert_eq!(schemata.to_string(), "L3:0=7ff;1=f0\nMB:0=100;1=50\n");
    }

    #[test]
    fn set_keeps_other_lines() {
        let mut schemata = Schemata::parse("L3CODE:0=7ff\nL3DATA:0=7ff\n").unwrap();

        schemata.set("L3DATA", 0, 0x3);
        schemata.set("L2", 2, 0xF);

        assert_eq!(schemata.to_string(), "L3CODE:0=7ff\nL3DATA:0=3\nL2:2=f\n");
    }

    #[test]
    fn set_all_touches_only_present_resource() {
        let mut schemata = Schemata::parse("MB:0=30;1=40\n").unwrap();

        schemata.set_all("MB", 100);
        schemata.set_all("L3", 0x7FF);

        assert_eq!(schemata.to_string(), "MB:0=100;1=100\n");
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert_eq!(Schemata::parse("L3 0=7ff"), None);
        assert_eq!(Schemata::parse("L3:0:7ff"), None);
        assert_eq!(Schemata::parse("L3:x=7ff"), None);
        assert_eq!(Schemata::parse("L3:0=zz"), None);
        assert_eq!(Schemata::parse(""), Some(Schemata::default()));
    }
}
