use rusqlite::types::ToSqlOutput;
use rusqlite::ToSql;

/// A single bound parameter value, convertible from the usual rust primitives.
#[derive(Debug, Clone)]
pub enum ToSqlType {
  Null,
  Integer(i64),
  Real(f64),
  Text(String),
  Blob(Vec<u8>),
}

impl ToSql for ToSqlType {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    return match self {
      Self::Null => Ok(ToSqlOutput::from(rusqlite::types::Null)),
      Self::Integer(i) => Ok(ToSqlOutput::from(*i)),
      Self::Real(f) => Ok(ToSqlOutput::from(*f)),
      Self::Text(s) => Ok(ToSqlOutput::from(s.as_str())),
      Self::Blob(b) => Ok(ToSqlOutput::from(b.as_slice())),
    };
  }
}

macro_rules! impl_from {
  ($ty:ty, $variant:ident) => {
    impl From<$ty> for ToSqlType {
      fn from(v: $ty) -> Self {
        return Self::$variant(v.into());
      }
    }
  };
}

impl_from!(i64, Integer);
impl_from!(i32, Integer);
impl_from!(f64, Real);
impl_from!(String, Text);
impl_from!(Vec<u8>, Blob);

impl From<&str> for ToSqlType {
  fn from(v: &str) -> Self {
    return Self::Text(v.to_string());
  }
}

impl<T: Into<ToSqlType>> From<Option<T>> for ToSqlType {
  fn from(v: Option<T>) -> Self {
    return match v {
      Some(v) => v.into(),
      None => Self::Null,
    };
  }
}

/// A set of named or positional parameters, bound to a prepared statement.
pub trait Params {
  fn bind(self, stmt: &mut rusqlite::Statement<'_>) -> rusqlite::Result<()>;
}

impl<const N: usize> Params for [ToSqlType; N] {
  fn bind(self, stmt: &mut rusqlite::Statement<'_>) -> rusqlite::Result<()> {
    for (idx, value) in self.into_iter().enumerate() {
      stmt.raw_bind_parameter(idx + 1, value)?;
    }
    return Ok(());
  }
}

impl Params for () {
  fn bind(self, _stmt: &mut rusqlite::Statement<'_>) -> rusqlite::Result<()> {
    return Ok(());
  }
}

#[macro_export]
macro_rules! params {
  () => {
    [] as [$crate::params::ToSqlType; 0]
  };
  ($($param:expr),+ $(,)?) => {
    [$(Into::<$crate::params::ToSqlType>::into($param)),+]
  };
}
