//! Table macros shared by the protocol modules.

/// Generates the declared-type enum from a table of UPnP type names.
///
/// Each row maps a variant to its wire name and coercion family. Unlisted
/// names parse to `Unknown` and keep their original spelling.
macro_rules! define_data_types {
    ($($variant:ident = $name:literal => $family:ident),* $(,)?) => {
        /// A primitive type declared in a service state table.
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum DataType {
            $($variant,)*
            Unknown(String),
        }

        impl DataType {
            /// Returns the name used in description documents.
            pub fn as_str(&self) -> &str {
                match self {
                    $(DataType::$variant => $name,)*
                    DataType::Unknown(name) => name.as_str(),
                }
            }

            /// Returns the coercion family for this type.
            pub fn family(&self) -> TypeFamily {
                match self {
                    $(DataType::$variant => TypeFamily::$family,)*
                    DataType::Unknown(_) => TypeFamily::Passthrough,
                }
            }
        }

        impl From<&str> for DataType {
            fn from(s: &str) -> Self {
                match s {
                    $($name => DataType::$variant,)*
                    other => DataType::Unknown(other.to_string()),
                }
            }
        }

        impl std::fmt::Display for DataType {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}
