/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

/// Key layout for one supervisor.
///
/// Every key starts with `<key_prefix>:<supervisor>`, so two supervisors for
/// different object kinds never share a lock or a location record even when
/// their objects use the same identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    /// Keys for `supervisor` under the configured `key_prefix`.
    pub fn new(key_prefix: &str, supervisor: &str) -> Self {
        Self {
            prefix: format!("{key_prefix}:{supervisor}"),
        }
    }

    /// `id` with the store's separators replaced, safe to embed in a key.
    pub fn safe_id(id: &str) -> String {
        id.replace(['/', ':'], "-")
    }

    /// Key whose presence means a creation attempt for `id` is in flight.
    pub fn creation_lock(&self, id: &str) -> String {
        format!("{}:Mngmt:{}:CreationLock", self.prefix, Self::safe_id(id))
    }

    /// Key holding the serialized location of `id`.
    pub fn child_address(&self, id: &str) -> String {
        format!("{}:Mngmt:{}:ChildAddress", self.prefix, Self::safe_id(id))
    }

    /// Key holding the whole child registry of the supervisor for `role`.
    pub fn children(&self, role: &str) -> String {
        format!("{}:Supervisor:{}:Children", self.prefix, role)
    }

    /// Prefix shared by all keys.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_sanitized_inside_keys() {
        let keys = KeySpace::new("acton", "orders");
        assert_eq!(
            keys.creation_lock("eu/1:2"),
            "acton:orders:Mngmt:eu-1-2:CreationLock"
        );
        assert_eq!(keys.child_address("7"), "acton:orders:Mngmt:7:ChildAddress");
        assert_eq!(keys.children("orders"), "acton:orders:Supervisor:orders:Children");
    }
}
