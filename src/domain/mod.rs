//! Domain vocabulary shared by the services and the HTTP layer.
//!
//! Enumerations are persisted as their string form, so `as_str` and
//! `FromStr` must stay in sync with the serde names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

string_enum! {
    /// Account role. Admins manage the catalog and orders.
    Role, "role" {
        Customer => "customer",
        Admin => "admin",
    }
}

string_enum! {
    Category, "category" {
        Chairs => "chairs",
        Tables => "tables",
        Sofas => "sofas",
        Beds => "beds",
        Storage => "storage",
        Lighting => "lighting",
        Decor => "decor",
        Outdoor => "outdoor",
        Other => "other",
    }
}

string_enum! {
    Material, "material" {
        Wood => "wood",
        Steel => "steel",
        Aluminum => "aluminum",
        Iron => "iron",
        Brass => "brass",
        Copper => "copper",
        Plastic => "plastic",
        Glass => "glass",
        Ceramic => "ceramic",
        Cloth => "cloth",
        Leather => "leather",
        Rattan => "rattan",
        Foam => "foam",
        Vinyl => "vinyl",
        Cotton => "cotton",
        Other => "other",
    }
}

string_enum! {
    PaymentStatus, "payment status" {
        Pending => "PENDING",
        Completed => "COMPLETED",
        Canceled => "CANCELED",
    }
}

string_enum! {
    DeliveryStatus, "delivery status" {
        NotDispatched => "NOT_DISPATCHED",
        Dispatched => "DISPATCHED",
    }
}

/// Kind of binary asset attached to a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Model,
}

impl AssetKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Model => "model",
        }
    }
}

/// Builds the product URL slug from its display name.
///
/// Whitespace runs collapse into a single `-`, commas are dropped and the
/// result is lowercased.
///
/// ```rust
/// use shopfront::domain::slugify;
///
/// assert_eq!(slugify("Oak Dining Table, Large"), "oak-dining-table-large");
/// ```
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut in_whitespace = false;

    for c in name.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                slug.push('-');
                in_whitespace = true;
            }
            continue;
        }
        in_whitespace = false;

        if c == ',' {
            continue;
        }
        slug.extend(c.to_lowercase());
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Chair"), "chair");
        assert_eq!(slugify("Lounge   Chair"), "lounge-chair");
        assert_eq!(slugify("Sofa, 3 seats"), "sofa-3-seats");
        assert_eq!(slugify(" Lamp\t\nXL "), "-lamp-xl-");
        assert_eq!(slugify("ŁÓŻKO Duże"), "łóżko-duże");
    }

    #[test]
    fn test_enum_round_trip_through_strings() {
        for material in Material::ALL {
            assert_eq!(material.as_str().parse::<Material>(), Ok(*material));
        }
        assert_eq!("COMPLETED".parse(), Ok(PaymentStatus::Completed));
        assert_eq!(DeliveryStatus::NotDispatched.to_string(), "NOT_DISPATCHED");
    }

    #[test]
    fn test_unknown_variant() {
        let err = "granite".parse::<Material>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown material: granite");
        assert!("Admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&PaymentStatus::Canceled).unwrap();
        assert_eq!(json, "\"CANCELED\"");
        let category: Category = serde_json::from_str("\"outdoor\"").unwrap();
        assert_eq!(category, Category::Outdoor);
    }
}
