// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

/// Implements a plain string JSON schema for enums whose wire form is a
/// bare string.
macro_rules! string_schema {
    ($ty:ty, $name:literal) => {
        impl schemars::JsonSchema for $ty {
            fn schema_name() -> std::borrow::Cow<'static, str> {
                std::borrow::Cow::Borrowed($name)
            }
            fn schema_id() -> std::borrow::Cow<'static, str> {
                std::borrow::Cow::Borrowed(concat!(module_path!(), "::", $name))
            }
            fn json_schema(_generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
                schemars::json_schema! {
                    {"type": "string"}
                }
            }
        }
    };
}

pub(crate) use string_schema;

pub mod cluster;
pub mod component;
pub mod condition;
pub mod k8s;
pub mod package;
pub mod volume;

pub const GROUP: &str = "platform.io";

/// Label stamped on every object the operator creates.
pub const MANAGED_BY_LABEL: &str = "belongTo";
pub const MANAGED_BY_VALUE: &str = "platform-operator";
