use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

/// A structure owned by the caller and shared with the registry.
pub type Shared<T> = Rc<RefCell<T>>;

pub fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

/// Who may touch a field through the settings endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// Exported, never imported
    ReadOnly,
    /// Imported, never exported
    WriteOnly,
    #[default]
    ReadWrite,
}

impl Policy {
    pub fn readable(self) -> bool {
        self != Policy::WriteOnly
    }

    pub fn writable(self) -> bool {
        self != Policy::ReadOnly
    }
}

type Getter<V> = Box<dyn Fn() -> V>;
type Setter<V> = Box<dyn Fn(V)>;

/// Accessor pair for one field, bound to the structure that owns it.
pub enum Field {
    Int {
        get: Getter<i64>,
        set: Setter<i64>,
        min: i64,
        max: i64,
        size: usize,
    },
    Bool {
        get: Getter<bool>,
        set: Setter<bool>,
    },
    Text {
        get: Getter<Vec<u8>>,
        set: Setter<Vec<u8>>,
        capacity: usize,
    },
}

impl Field {
    /// Integer field projected out of `owner`.
    pub fn int<T, I, L>(owner: &Shared<T>, lens: L) -> Self
    where
        T: 'static,
        I: Copy + Into<i64> + TryFrom<i64> + Bounded + 'static,
        L: Fn(&mut T) -> &mut I + 'static,
    {
        let lens = Rc::new(lens);
        let (r, w) = (owner.clone(), owner.clone());
        let lens_w = lens.clone();
        Field::Int {
            get: Box::new(move || (*(*lens)(&mut *r.borrow_mut())).into()),
            set: Box::new(move |v: i64| {
                if let Ok(v) = I::try_from(v) {
                    *(*lens_w)(&mut *w.borrow_mut()) = v;
                }
            }),
            min: I::MIN_I64,
            max: I::MAX_I64,
            size: std::mem::size_of::<I>(),
        }
    }

    pub fn bool<T, L>(owner: &Shared<T>, lens: L) -> Self
    where
        T: 'static,
        L: Fn(&mut T) -> &mut bool + 'static,
    {
        let lens = Rc::new(lens);
        let (r, w) = (owner.clone(), owner.clone());
        let lens_w = lens.clone();
        Field::Bool {
            get: Box::new(move || *(*lens)(&mut *r.borrow_mut())),
            set: Box::new(move |v: bool| *(*lens_w)(&mut *w.borrow_mut()) = v),
        }
    }

    /// Fixed-capacity character buffer, NUL terminated when shorter.
    pub fn text<T, const N: usize, L>(owner: &Shared<T>, lens: L) -> Self
    where
        T: 'static,
        L: Fn(&mut T) -> &mut [u8; N] + 'static,
    {
        let lens = Rc::new(lens);
        let (r, w) = (owner.clone(), owner.clone());
        let lens_w = lens.clone();
        Field::Text {
            get: Box::new(move || (*lens)(&mut *r.borrow_mut()).to_vec()),
            set: Box::new(move |v: Vec<u8>| {
                let mut owner = w.borrow_mut();
                let buf = (*lens_w)(&mut *owner);
                buf.fill(0);
                let n = v.len().min(N);
                buf[..n].copy_from_slice(&v[..n]);
            }),
            capacity: N,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Field::Int { size, .. } => *size,
            Field::Bool { .. } => 1,
            Field::Text { capacity, .. } => *capacity,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Field::Int { get, .. } => Value::from(get()),
            Field::Bool { get, .. } => Value::Bool(get()),
            Field::Text { get, .. } => Value::String(crate::store::until_nul(&get())),
        }
    }

    /// Copy `value` into the field. Returns false when the value does not fit
    /// the field's kind or range; the field is then left unchanged.
    pub fn from_json(&self, value: &Value) -> bool {
        match (self, value) {
            (Field::Int { set, min, max, .. }, Value::Number(n)) => {
                let v = match n.as_i64() {
                    Some(v) => v,
                    None => match n.as_f64() {
                        Some(f) if f.is_finite() => f.trunc() as i64,
                        _ => return false,
                    },
                };
                if v < *min || v > *max {
                    return false;
                }
                set(v);
                true
            }
            (Field::Bool { set, .. }, Value::Bool(b)) => {
                set(*b);
                true
            }
            (Field::Text { set, capacity, .. }, Value::String(s)) => {
                set(truncate_on_char(s, *capacity).as_bytes().to_vec());
                true
            }
            _ => false,
        }
    }

    pub fn clear_data(&self) {
        match self {
            Field::Int { set, .. } => set(0),
            Field::Bool { set, .. } => set(false),
            Field::Text { set, .. } => set(Vec::new()),
        }
    }
}

fn truncate_on_char(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Range of an integer field type, widened to `i64`.
pub trait Bounded {
    const MIN_I64: i64;
    const MAX_I64: i64;
}

macro_rules! bounded {
    ($($t:ty),*) => {
        $(impl Bounded for $t {
            const MIN_I64: i64 = <$t>::MIN as i64;
            const MAX_I64: i64 = <$t>::MAX as i64;
        })*
    };
}

bounded!(i8, i16, i32, i64, u8, u16, u32);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Sample {
        level: i8,
        port: u16,
        on: bool,
        label: [u8; 6],
    }

    #[test]
    fn test_int_range_is_enforced() {
        let s = shared(Sample::default());
        let level = Field::int(&s, |c: &mut Sample| &mut c.level);
        assert!(level.from_json(&json!(-5)));
        assert!(!level.from_json(&json!(300)));
        assert_eq!(s.borrow().level, -5);
        assert_eq!(level.to_json(), json!(-5));
        assert_eq!(level.size(), 1);
    }

    #[test]
    fn test_float_truncates() {
        let s = shared(Sample::default());
        let port = Field::int(&s, |c: &mut Sample| &mut c.port);
        assert!(port.from_json(&json!(8080.9)));
        assert_eq!(s.borrow().port, 8080);
    }

    #[test]
    fn test_kind_mismatch_is_ignored() {
        let s = shared(Sample::default());
        let on = Field::bool(&s, |c: &mut Sample| &mut c.on);
        assert!(!on.from_json(&json!("true")));
        assert!(!s.borrow().on);
        assert!(on.from_json(&json!(true)));
        assert!(s.borrow().on);
    }

    #[test]
    fn test_text_truncates_and_pads() {
        let s = shared(Sample::default());
        let label = Field::text(&s, |c: &mut Sample| &mut c.label);
        assert!(label.from_json(&json!("kitchen-sensor")));
        assert_eq!(&s.borrow().label, b"kitche");
        assert_eq!(label.to_json(), json!("kitche"));

        assert!(label.from_json(&json!("ab")));
        assert_eq!(&s.borrow().label, b"ab\0\0\0\0");
        assert_eq!(label.to_json(), json!("ab"));
    }

    #[test]
    fn test_text_keeps_whole_characters() {
        let s = shared(Sample::default());
        let label = Field::text(&s, |c: &mut Sample| &mut c.label);
        // "äää" is 6 bytes, "ääää" would be 8
        assert!(label.from_json(&json!("ääää")));
        assert_eq!(label.to_json(), json!("äää"));
    }

    #[test]
    fn test_clear_data() {
        let s = shared(Sample {
            level: 3,
            port: 80,
            on: true,
            label: *b"abcdef",
        });
        Field::int(&s, |c: &mut Sample| &mut c.level).clear_data();
        Field::bool(&s, |c: &mut Sample| &mut c.on).clear_data();
        Field::text(&s, |c: &mut Sample| &mut c.label).clear_data();
        let s = s.borrow();
        assert_eq!((s.level, s.on, s.label), (0, false, [0; 6]));
        assert_eq!(s.port, 80);
    }
}
