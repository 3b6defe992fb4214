//! Canonical type addresses for the dependency graph.
//!
//! Every producer, parameter and output is identified by an [`Address`]: a
//! deterministic string derived from the Rust type. The resolver parses the
//! output of [`std::any::type_name`] into a small canonical grammar so the same
//! type always lands on the same graph node, no matter who mentions it first.

use std::any::TypeId;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

const ROOT: &str = "ROOT";
const ERROR: &str = "error";
const NIL: &str = "nil";

/// Canonical identity of a type, used as the dependency graph node key.
///
/// Two registrations that mention the same type resolve to the same address.
/// Cloning is cheap (the string is shared).
///
/// # Examples
///
/// ```rust
/// use ferrous_boot::Address;
/// use std::collections::HashMap;
/// use std::sync::Arc;
///
/// assert_eq!(Address::of::<i32>(), "i32");
/// assert_eq!(Address::of::<Vec<u8>>(), "[]u8");
/// assert_eq!(Address::of::<Arc<String>>(), "*alloc::string.String");
/// assert_eq!(Address::of::<HashMap<String, u32>>(), "map[alloc::string.String]u32");
/// assert_eq!(Address::of::<()>(), "struct{}");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(Arc<str>);

impl Address {
    /// Resolves the address of `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::from_type_name(std::any::type_name::<T>())
    }

    /// Resolves the address for a raw `type_name` string.
    pub fn from_type_name(type_name: &str) -> Self {
        Self(Arc::from(canonical(type_name)))
    }

    /// Address of the collection node for trait objects `I`.
    ///
    /// ```rust
    /// use ferrous_boot::Address;
    ///
    /// trait Plugin {}
    /// assert!(Address::collection_of::<dyn Plugin>().as_str().starts_with("[]"));
    /// ```
    pub fn collection_of<I: ?Sized + 'static>() -> Self {
        Self(Arc::from(format!("[]{}", Self::of::<I>())))
    }

    /// Collection node fed by a value stored at this address.
    ///
    /// `Arc<dyn I>` (`*I`) and `Vec<Arc<dyn I>>` (`[]*I`) values are flattened
    /// into the collection of `I` (`[]I`).
    pub fn feeds_collection(&self) -> Option<Address> {
        let element = self
            .0
            .strip_prefix("[]*")
            .or_else(|| self.0.strip_prefix('*'))?;
        Some(Self(Arc::from(format!("[]{}", element))))
    }

    /// Address of a producer function `F` with the given parameter and
    /// output addresses.
    ///
    /// The identity token is derived from the `TypeId` of `F`, so two closures
    /// with identical signatures never collide while the same fn item always
    /// resolves to the same address.
    pub fn function<F: ?Sized + 'static>(inputs: &[Address], outputs: &[Address]) -> Self {
        let mut hasher = DefaultHasher::new();
        TypeId::of::<F>().hash(&mut hasher);
        let token = hasher.finish();

        let ins = inputs.iter().map(Address::as_str).collect::<Vec<_>>().join(", ");
        let outs = match outputs {
            [] => String::new(),
            [single] => format!(" {}", single),
            many => format!(
                " ({})",
                many.iter().map(Address::as_str).collect::<Vec<_>>().join(", ")
            ),
        };
        Self(Arc::from(format!("func[{:016x}]({}){}", token, ins, outs)))
    }

    /// Synthetic root of the dependency graph.
    pub fn root() -> Self {
        Self(Arc::from(ROOT))
    }

    /// Shared address of every error type.
    pub fn error() -> Self {
        Self(Arc::from(ERROR))
    }

    /// Address of "no type".
    pub fn nil() -> Self {
        Self(Arc::from(NIL))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        &*self.0 == ROOT
    }

    pub fn is_error(&self) -> bool {
        &*self.0 == ERROR
    }

    /// True for producer function addresses and function pointer types.
    pub fn is_function(&self) -> bool {
        self.0.starts_with("func[") || self.0.starts_with("func(")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:?})", &*self.0)
    }
}

impl PartialEq<str> for Address {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for Address {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Runtime type metadata attached to every stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeInfo {
    pub id: TypeId,
    pub name: &'static str,
}

impl TypeInfo {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

/// Converts a `std::any::type_name` string into its canonical address form.
///
/// Total and deterministic: any input, including garbage, yields a string and
/// the empty input yields `nil`.
///
/// ```rust
/// use ferrous_boot::address::canonical;
///
/// assert_eq!(canonical(""), "nil");
/// assert_eq!(canonical("[u8; 4]"), "[4]u8");
/// assert_eq!(canonical("fn(i32) -> alloc::string::String"), "func(i32) alloc::string.String");
/// assert_eq!(canonical("dyn core::error::Error + core::marker::Send"), "error");
/// ```
pub fn canonical(type_name: &str) -> String {
    let trimmed = type_name.trim();
    if trimmed.is_empty() {
        return NIL.to_string();
    }
    let mut parser = Parser::new(trimmed);
    let mut out = parser.parse_type();
    // Anything the grammar did not consume is kept verbatim.
    while !parser.at_end() {
        if let Some(c) = parser.bump() {
            out.push(c);
        }
    }
    if out.is_empty() {
        NIL.to_string()
    } else {
        out
    }
}

const AUTO_TRAITS: &[&str] = &[
    "core::marker::Send",
    "core::marker::Sync",
    "core::marker::Unpin",
    "core::panic::unwind_safe::UnwindSafe",
    "core::panic::unwind_safe::RefUnwindSafe",
    "std::panic::UnwindSafe",
    "std::panic::RefUnwindSafe",
    "Send",
    "Sync",
];

const ERROR_PATHS: &[&str] = &[
    "core::error::Error",
    "std::error::Error",
    "anyhow::Error",
];

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self { chars: input.chars().collect(), pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn starts_with(&self, s: &str) -> bool {
        let mut i = self.pos;
        for c in s.chars() {
            if self.chars.get(i) != Some(&c) {
                return false;
            }
            i += 1;
        }
        true
    }

    fn eat(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            self.pos += s.chars().count();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse_type(&mut self) -> String {
        self.skip_ws();
        let Some(c) = self.peek() else {
            return String::new();
        };
        match c {
            '&' => {
                self.bump();
                if self.eat("mut ") {
                    format!("&mut {}", self.parse_type())
                } else {
                    format!("&{}", self.parse_type())
                }
            }
            '*' => {
                self.bump();
                if self.eat("const ") {
                    format!("*const {}", self.parse_type())
                } else if self.eat("mut ") {
                    format!("*mut {}", self.parse_type())
                } else {
                    format!("*{}", self.parse_type())
                }
            }
            '[' => self.parse_array(),
            '(' => {
                let items = self.parse_list('(', ')');
                if items.is_empty() {
                    "struct{}".to_string()
                } else {
                    format!("struct{{{}}}", items.join("; "))
                }
            }
            _ if self.starts_with("dyn ") => self.parse_dyn(),
            _ if self.starts_with("fn(")
                || self.starts_with("unsafe ")
                || self.starts_with("extern ") =>
            {
                self.parse_fn()
            }
            _ => self.parse_path(),
        }
    }

    fn parse_array(&mut self) -> String {
        self.bump();
        let elem = self.parse_type();
        self.skip_ws();
        if self.peek() == Some(';') {
            self.bump();
            let mut len = String::new();
            while let Some(c) = self.peek() {
                if c == ']' {
                    break;
                }
                self.bump();
                if !c.is_whitespace() {
                    len.push(c);
                }
            }
            self.bump();
            format!("[{}]{}", len, elem)
        } else {
            if self.peek() == Some(']') {
                self.bump();
            }
            format!("[]{}", elem)
        }
    }

    /// Parses `open T, U, ... close`, returning the canonical items.
    fn parse_list(&mut self, open: char, close: char) -> Vec<String> {
        let mut items = Vec::new();
        if self.peek() != Some(open) {
            return items;
        }
        self.bump();
        loop {
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(c) if c == close => {
                    self.bump();
                    break;
                }
                Some(',') => {
                    self.bump();
                }
                Some(_) => {
                    let before = self.pos;
                    let mut item = self.parse_type();
                    self.skip_ws();
                    // Associated type bindings: `Item = T`.
                    if self.peek() == Some('=') {
                        self.bump();
                        item = format!("{}={}", item, self.parse_type());
                    }
                    if self.pos == before {
                        // Unparseable character: keep it and move on.
                        if let Some(c) = self.bump() {
                            item.push(c);
                        }
                    }
                    items.push(item);
                }
            }
        }
        items
    }

    fn parse_dyn(&mut self) -> String {
        self.eat("dyn ");
        let mut bounds = Vec::new();
        let mut is_error = false;
        loop {
            self.skip_ws();
            let start = self.pos;
            let bound = self.parse_path();
            if self.pos == start {
                break;
            }
            let raw: String = self.chars[start..self.pos].iter().collect();
            let path = raw.split('<').next().unwrap_or_default().trim().to_string();
            if ERROR_PATHS.contains(&path.as_str()) {
                is_error = true;
            } else if !AUTO_TRAITS.contains(&path.as_str()) && !path.starts_with('\'') {
                bounds.push(bound);
            }
            self.skip_ws();
            if !self.eat("+") {
                break;
            }
        }
        if is_error {
            ERROR.to_string()
        } else if bounds.is_empty() {
            "dyn".to_string()
        } else {
            bounds.join(" + ")
        }
    }

    fn parse_fn(&mut self) -> String {
        while !self.at_end() && !self.starts_with("fn(") {
            self.bump();
        }
        self.eat("fn");
        let inputs = self.parse_list('(', ')');
        let mut out = format!("func({})", inputs.join(", "));
        self.skip_ws();
        if self.eat("->") {
            let ret = self.parse_type();
            if !ret.is_empty() {
                out.push(' ');
                out.push_str(&ret);
            }
        }
        out
    }

    fn parse_segment(&mut self) -> String {
        let mut seg = String::new();
        if self.peek() == Some('<') {
            // Qualified segment such as `<T as Trait>`: keep it verbatim.
            let mut depth = 0usize;
            while let Some(c) = self.bump() {
                seg.push(c);
                match c {
                    '<' => depth += 1,
                    '>' => {
                        depth = depth.saturating_sub(1);
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
            }
            return seg;
        }
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '{' || c == '}' || c == '#' || c == '\'' {
                seg.push(c);
                self.bump();
            } else {
                break;
            }
        }
        seg
    }

    fn parse_path(&mut self) -> String {
        let mut segments: Vec<String> = Vec::new();
        let mut generics: Vec<String> = Vec::new();
        loop {
            let seg = self.parse_segment();
            if seg.is_empty() {
                break;
            }
            segments.push(seg);
            if self.peek() == Some('<') {
                generics = self.parse_list('<', '>');
            }
            if self.starts_with("::") {
                self.eat("::");
                generics.clear();
            } else {
                break;
            }
        }
        if segments.is_empty() {
            return String::new();
        }
        resolve_path(&segments, generics)
    }
}

fn first_or_nil(generics: &[String]) -> String {
    generics.first().cloned().unwrap_or_else(|| NIL.to_string())
}

fn resolve_path(segments: &[String], generics: Vec<String>) -> String {
    let full = segments.join("::");
    let last = segments.last().map(String::as_str).unwrap_or_default();
    if ERROR_PATHS.contains(&full.as_str()) {
        return ERROR.to_string();
    }
    match full.as_str() {
        "alloc::sync::Arc" | "std::sync::Arc" => return format!("*{}", first_or_nil(&generics)),
        "alloc::vec::Vec" | "std::vec::Vec" => return format!("[]{}", first_or_nil(&generics)),
        "alloc::boxed::Box" if generics.first().map(String::as_str) == Some(ERROR) => {
            return ERROR.to_string();
        }
        "std::collections::hash::map::HashMap" | "alloc::collections::btree::map::BTreeMap" => {
            let key = first_or_nil(&generics);
            let value = generics.get(1).cloned().unwrap_or_else(|| NIL.to_string());
            return format!("map[{}]{}", key, value);
        }
        _ => {}
    }
    if full.contains("mpsc") || full.contains("mpmc") || full.contains("broadcast") {
        let prefix = match last {
            "Sender" if full.contains("broadcast") => Some("chan "),
            "Sender" | "SyncSender" | "UnboundedSender" => Some("chan<- "),
            "Receiver" | "UnboundedReceiver" => Some("<-chan "),
            _ => None,
        };
        if let Some(prefix) = prefix {
            return format!("{}{}", prefix, first_or_nil(&generics));
        }
    }

    let name = if generics.is_empty() {
        last.to_string()
    } else {
        format!("{}<{}>", last, generics.join(", "))
    };
    if segments.len() == 1 {
        name
    } else {
        format!("{}.{}", segments[..segments.len() - 1].join("::"), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    mod inner {
        pub struct Widget;
        pub trait Greeter {}
    }

    #[test]
    fn test_named_types_split_namespace() {
        let addr = Address::of::<inner::Widget>();
        assert!(addr.as_str().ends_with("inner.Widget"), "got {}", addr);
        assert_eq!(Address::of::<String>(), "alloc::string.String");
    }

    #[test]
    fn test_primitives_and_composites() {
        assert_eq!(Address::of::<u64>(), "u64");
        assert_eq!(Address::of::<[u8; 16]>(), "[16]u8");
        assert_eq!(Address::of::<Vec<Vec<i32>>>(), "[][]i32");
        assert_eq!(Address::of::<Arc<Vec<u8>>>(), "*[]u8");
        assert_eq!(Address::of::<BTreeMap<u8, bool>>(), "map[u8]bool");
        assert_eq!(Address::of::<HashMap<u8, Vec<bool>>>(), "map[u8][]bool");
        assert_eq!(Address::of::<(i32, bool)>(), "struct{i32; bool}");
        assert_eq!(Address::of::<&'static str>(), "&str");
    }

    #[test]
    fn test_channels() {
        assert_eq!(Address::of::<std::sync::mpsc::Sender<u8>>(), "chan<- u8");
        assert_eq!(Address::of::<std::sync::mpsc::Receiver<u8>>(), "<-chan u8");
        assert_eq!(Address::of::<tokio::sync::mpsc::Sender<u8>>(), "chan<- u8");
        assert_eq!(Address::of::<tokio::sync::mpsc::UnboundedReceiver<u8>>(), "<-chan u8");
        assert_eq!(Address::of::<tokio::sync::broadcast::Sender<u8>>(), "chan u8");
    }

    #[test]
    fn test_errors_collapse() {
        assert_eq!(Address::of::<dyn std::error::Error + Send + Sync>(), "error");
        assert_eq!(Address::of::<Box<dyn std::error::Error + Send + Sync>>(), "error");
        assert!(Address::of::<dyn std::error::Error>().is_error());
    }

    #[test]
    fn test_trait_objects_drop_auto_traits() {
        let plain = Address::of::<dyn inner::Greeter>();
        let bounded = Address::of::<dyn inner::Greeter + Send + Sync>();
        assert_eq!(plain, bounded);
        assert!(plain.as_str().ends_with("inner.Greeter"));
    }

    #[test]
    fn test_fn_pointers() {
        assert_eq!(Address::of::<fn(i32) -> String>(), "func(i32) alloc::string.String");
        assert_eq!(Address::of::<fn()>(), "func()");
        assert!(Address::of::<fn(u8, u8)>().is_function());
    }

    #[test]
    fn test_function_tokens_distinguish_closures() {
        let a = |_: i32| 1u8;
        let b = |_: i32| 1u8;
        let ins = [Address::of::<i32>()];
        let outs = [Address::of::<u8>()];
        let addr_a = function_address_of(&a, &ins, &outs);
        let addr_b = function_address_of(&b, &ins, &outs);
        assert_ne!(addr_a, addr_b);
        assert_eq!(addr_a, function_address_of(&a, &ins, &outs));
        assert!(addr_a.is_function());
        assert!(addr_a.as_str().ends_with("(i32) u8"));
    }

    fn function_address_of<F: 'static>(_f: &F, ins: &[Address], outs: &[Address]) -> Address {
        Address::function::<F>(ins, outs)
    }

    #[test]
    fn test_feeds_collection() {
        let list = Address::of::<Vec<Arc<dyn inner::Greeter>>>();
        let single = Address::of::<Arc<dyn inner::Greeter>>();
        let node = Address::collection_of::<dyn inner::Greeter>();
        assert_eq!(list.feeds_collection(), Some(node.clone()));
        assert_eq!(single.feeds_collection(), Some(node));
        assert_eq!(Address::of::<u8>().feeds_collection(), None);
    }

    #[test]
    fn test_synthetic_nodes() {
        assert!(Address::root().is_root());
        assert_eq!(Address::nil(), "nil");
        assert_eq!(canonical("   "), "nil");
    }

    #[test]
    fn test_garbage_is_total() {
        for input in ["<<<", "[;", "fn(", "dyn +", "a::<b", "&&&", ")))", "x<y=>"] {
            let first = canonical(input);
            assert_eq!(first, canonical(input));
        }
    }
}
