//! Search filter construction.
//!
//! Values are escaped with [`ldap3::ldap_escape`]; attribute names are
//! trusted and passed through.

use ldap3::ldap_escape;

/// `(attribute=value)`
pub fn eq(attribute: &str, value: &str) -> String {
    format!("({}={})", attribute, ldap_escape(value))
}

/// `(attribute=*)`
pub fn present(attribute: &str) -> String {
    format!("({}=*)", attribute)
}

/// OR of already-built clauses. A single clause is returned unwrapped.
pub fn or<I, S>(clauses: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    combine('|', clauses)
}

/// AND of already-built clauses. A single clause is returned unwrapped.
pub fn and<I, S>(clauses: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    combine('&', clauses)
}

/// `(!clause)`
pub fn not(clause: &str) -> String {
    format!("(!{})", clause)
}

/// `(|(attribute=v1)(attribute=v2)...)`
pub fn any_of<I, S>(attribute: &str, values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    or(values.into_iter().map(|v| eq(attribute, v.as_ref())))
}

fn combine<I, S>(op: char, clauses: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let clauses: Vec<S> = clauses.into_iter().collect();
    if clauses.len() == 1 {
        return clauses[0].as_ref().to_string();
    }
    let mut filter = String::from("(");
    filter.push(op);
    for clause in &clauses {
        filter.push_str(clause.as_ref());
    }
    filter.push(')');
    filter
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_eq_escapes_value() {
        assert_eq!(eq("uid", "alice"), "(uid=alice)");
        assert_eq!(eq("cn", "a*b(c)"), r"(cn=a\2ab\28c\29)");
    }

    #[test]
    fn test_or_and_single_clause() {
        assert_eq!(or(["(a=1)"]), "(a=1)");
        assert_eq!(and(["(a=1)", "(b=2)"]), "(&(a=1)(b=2))");
    }

    #[test]
    fn test_any_of() {
        assert_eq!(any_of("uid", ["a", "b"]), "(|(uid=a)(uid=b))");
        assert_eq!(
            or([present("mail"), present("cn")]),
            "(|(mail=*)(cn=*))"
        );
        assert_eq!(not("(a=1)"), "(!(a=1))");
    }

    proptest! {
        /// Property: escaped values never carry raw filter metacharacters.
        #[test]
        fn prop_eq_value_is_escaped(value in ".{0,32}") {
            let filter = eq("cn", &value);
            let inner = &filter[4..filter.len() - 1];
            prop_assert!(!inner.contains('('));
            prop_assert!(!inner.contains(')'));
            prop_assert!(!inner.contains('*'));
        }
    }
}
