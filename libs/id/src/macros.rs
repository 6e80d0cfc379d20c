/// Defines a `Copy` ULID id rendered as `{prefix}_{ulid}`.
///
/// ```ignore
/// define_id!(LocationId, "loc");
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[doc = concat!("`", $prefix, "_`-prefixed ULID.")]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($crate::Ulid);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            #[must_use]
            pub fn new() -> Self {
                Self($crate::Ulid::new())
            }

            #[must_use]
            pub const fn ulid(&self) -> $crate::Ulid {
                self.0
            }

            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                $crate::parse_prefixed(s, Self::PREFIX).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}_{}", Self::PREFIX, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = std::borrow::Cow::<'de, str>::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Defines an allocator issuing `$id` values from `1` upwards, never the
/// same value twice.
#[macro_export]
macro_rules! define_allocator {
    ($name:ident, $id:ident) => {
        #[doc = concat!("Issues [`", stringify!($id), "`]s starting at `1`.")]
        #[derive(Debug, Clone, Default)]
        pub struct $name {
            last: u64,
        }

        impl $name {
            pub fn new() -> Self {
                Self::default()
            }

            pub fn next_id(&mut self) -> $id {
                self.last += 1;
                $id::new(self.last)
            }

            /// The most recently issued id, if any.
            pub fn last_issued(&self) -> Option<$id> {
                (self.last > 0).then(|| $id::new(self.last))
            }
        }
    };
}
