//! Brazilian federative units with their IBGE codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

macro_rules! ufs {
    ($($uf:ident = $code:literal),* $(,)?) => {
        /// Federative unit (state) of the issuer or recipient.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
        pub enum Uf {
            $($uf),*
        }

        impl Uf {
            /// All units, in IBGE code order.
            pub const ALL: &'static [Uf] = &[$(Uf::$uf),*];

            /// IBGE code (cUF).
            pub fn code(self) -> u8 {
                match self {
                    $(Uf::$uf => $code),*
                }
            }

            /// Two-letter acronym.
            pub fn acronym(self) -> &'static str {
                match self {
                    $(Uf::$uf => stringify!($uf)),*
                }
            }

            /// Look up a unit by IBGE code.
            pub fn from_code(code: u8) -> Option<Uf> {
                match code {
                    $($code => Some(Uf::$uf),)*
                    _ => None,
                }
            }
        }

        impl FromStr for Uf {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $(stringify!($uf) => Ok(Uf::$uf),)*
                    other => Err(DomainError::validation(format!("Unknown UF '{}'", other))),
                }
            }
        }
    };
}

ufs! {
    RO = 11, AC = 12, AM = 13, RR = 14, PA = 15, AP = 16, TO = 17,
    MA = 21, PI = 22, CE = 23, RN = 24, PB = 25, PE = 26, AL = 27, SE = 28, BA = 29,
    MG = 31, ES = 32, RJ = 33, SP = 35,
    PR = 41, SC = 42, RS = 43,
    MS = 50, MT = 51, GO = 52, DF = 53,
}

impl fmt::Display for Uf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.acronym())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip_through_lookup() {
        assert_eq!(Uf::SP.code(), 35);
        assert_eq!(Uf::from_code(43), Some(Uf::RS));
        assert_eq!(Uf::from_code(99), None);
        assert_eq!(Uf::ALL.len(), 27);
    }

    #[test]
    fn test_parse_acronym() {
        assert_eq!("mg".parse::<Uf>().unwrap(), Uf::MG);
        assert!("XX".parse::<Uf>().is_err());
    }
}
