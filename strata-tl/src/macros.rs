//! Declarative helpers that expand to the same shape of code the schema
//! generator emits: a `struct` / `enum` definition plus `Identifiable`,
//! `Serializable` and `Deserializable` impls.
//!
//! Constructors with a `flags` word are written out by hand next to the
//! macro invocations.

/// A bare constructor without conditional fields.
///
/// Fields are written in declaration order; the constructor ID is *not*
/// written (it belongs to the boxed enum).
macro_rules! tl_struct {
    (
        $(#[$meta:meta])*
        pub struct $name:ident = $id:literal {
            $( pub $field:ident : $ty:ty, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug)]
        #[derive(Clone, PartialEq)]
        pub struct $name {
            $( pub $field: $ty, )*
        }

        impl crate::Identifiable for $name {
            const CONSTRUCTOR_ID: u32 = $id;
        }

        impl crate::Serializable for $name {
            #[allow(unused_variables)]
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                $( crate::Serializable::serialize(&self.$field, buf); )*
            }
        }

        impl crate::Deserializable for $name {
            #[allow(unused_variables)]
            fn deserialize(buf: crate::deserialize::Buffer) -> crate::deserialize::Result<Self> {
                $( let $field = <$ty as crate::Deserializable>::deserialize(buf)?; )*
                Ok(Self { $( $field, )* })
            }
        }
    };
}

/// An RPC function without conditional parameters.
///
/// Serialization writes the constructor ID first, as every function call is
/// boxed on the wire.
macro_rules! tl_function {
    (
        $(#[$meta:meta])*
        pub struct $name:ident = $id:literal -> $ret:ty {
            $( pub $field:ident : $ty:ty, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug)]
        #[derive(Clone, PartialEq)]
        pub struct $name {
            $( pub $field: $ty, )*
        }

        impl crate::Identifiable for $name {
            const CONSTRUCTOR_ID: u32 = $id;
        }

        impl crate::Serializable for $name {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                crate::Serializable::serialize(&<Self as crate::Identifiable>::CONSTRUCTOR_ID, buf);
                $( crate::Serializable::serialize(&self.$field, buf); )*
            }
        }

        impl crate::RemoteCall for $name {
            type Return = $ret;
        }
    };
}

/// A boxed type whose constructors all carry data.
///
/// Every variant wraps exactly one bare constructor type; the enum writes and
/// dispatches on that type's constructor ID.
macro_rules! tl_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $variant:ident($ty:ty), )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug)]
        #[derive(Clone, PartialEq)]
        pub enum $name {
            $( $variant($ty), )+
        }

        impl crate::Serializable for $name {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                match self {
                    $( Self::$variant(x) => {
                        crate::Serializable::serialize(&<$ty as crate::Identifiable>::CONSTRUCTOR_ID, buf);
                        crate::Serializable::serialize(x, buf);
                    } )+
                }
            }
        }

        impl crate::Deserializable for $name {
            fn deserialize(buf: crate::deserialize::Buffer) -> crate::deserialize::Result<Self> {
                let id = <u32 as crate::Deserializable>::deserialize(buf)?;
                Ok(match id {
                    $( <$ty as crate::Identifiable>::CONSTRUCTOR_ID => {
                        Self::$variant(<$ty as crate::Deserializable>::deserialize(buf)?)
                    } )+
                    _ => return Err(crate::deserialize::Error::UnexpectedConstructor { id }),
                })
            }
        }

        $(
            impl From<$ty> for $name {
                fn from(x: $ty) -> Self {
                    Self::$variant(x)
                }
            }
        )+
    };
}
