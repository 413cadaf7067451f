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

use std::fmt::Debug;

/// A message addressed to one business object.
///
/// Usually implemented with `#[object_message]`.
pub trait ObjectMessage: Clone + Debug + Send + Sync + 'static {
    /// What the object answers with.
    type Reply: Debug + Send + 'static;

    /// Identity of the target object. Never empty for a valid message.
    fn object_id(&self) -> &str;
}
