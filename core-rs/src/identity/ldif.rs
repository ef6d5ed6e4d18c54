//! LDIF rendering of user entries for bulk loading

use base64::{engine::general_purpose, Engine as _};

use super::IdentityRecord;
use crate::clock::format_wire_timestamp;
use crate::errors::Result;

const USER_OBJECT_CLASSES: &[&str] = &[
    "ipaobject",
    "person",
    "top",
    "ipasshuser",
    "inetorgperson",
    "organizationalperson",
    "krbticketpolicyaux",
    "krbprincipalaux",
    "inetuser",
    "posixaccount",
    "ipaSshGroupOfPubKeys",
    "mepOriginEntry",
];

/// Directory coordinates needed to build DNs and principals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdifContext {
    /// Base DN, e.g. `dc=ipa,dc=test`
    pub suffix: String,
    pub realm: String,
    pub domain: String,
}

impl LdifContext {
    /// Derive the suffix and realm from a DNS domain
    pub fn for_domain(domain: &str) -> Self {
        let suffix = domain
            .split('.')
            .filter(|label| !label.is_empty())
            .map(|label| format!("dc={}", label))
            .collect::<Vec<_>>()
            .join(",");
        Self {
            suffix,
            realm: domain.to_uppercase(),
            domain: domain.to_string(),
        }
    }

    pub fn user_dn(&self, login: &str) -> String {
        format!("uid={},cn=users,cn=accounts,{}", login, self.suffix)
    }
}

/// Render one `add` entry
pub fn to_ldif(record: &IdentityRecord, ctx: &LdifContext) -> Result<String> {
    let uid = record.login.as_str();
    let display = format!("{0} {0}", record.full_name());
    let initials: String = {
        let chars: Vec<char> = uid.chars().collect();
        match (chars.get(1), chars.last()) {
            (Some(second), Some(last)) => format!("{}{}", second, last),
            _ => uid.to_string(),
        }
    };
    let given = record.first_name.clone().unwrap_or_else(|| uid.to_string());
    let surname = record.last_name.clone().unwrap_or_else(|| uid.to_string());
    let principal = format!("{}@{}", uid, ctx.realm);

    let mut entry = String::new();
    push_attr(&mut entry, "dn", &ctx.user_dn(uid));
    for class in USER_OBJECT_CLASSES {
        push_attr(&mut entry, "objectClass", class);
    }
    push_attr(&mut entry, "ipaUniqueID", "autogenerate");
    push_attr(&mut entry, "loginShell", "/bin/zsh");
    push_attr(&mut entry, "uidNumber", "-1");
    push_attr(&mut entry, "gidNumber", "-1");
    push_attr(&mut entry, "uid", uid);
    push_attr(&mut entry, "displayName", &display);
    push_attr(&mut entry, "initials", &initials);
    push_attr(&mut entry, "gecos", &display);
    push_attr(&mut entry, "sn", &surname);
    push_attr(&mut entry, "homeDirectory", &format!("/other-home/{}", uid));
    for mail in &record.mail {
        push_attr(&mut entry, "mail", mail);
    }
    push_attr(&mut entry, "krbPrincipalName", &principal);
    push_attr(&mut entry, "krbCanonicalName", &principal);
    push_attr(&mut entry, "givenName", &given);
    push_attr(&mut entry, "cn", &display);
    if let Some(expiration) = record.expiration {
        push_attr(&mut entry, "krbPasswordExpiration", &format_wire_timestamp(expiration)?);
    }
    if let Some(password) = &record.password {
        push_attr(&mut entry, "userPassword", password);
    }
    Ok(entry)
}

/// Render a batch, entries separated by blank lines
pub fn batch_ldif<'a, I>(records: I, ctx: &LdifContext) -> Result<String>
where
    I: IntoIterator<Item = &'a IdentityRecord>,
{
    let entries = records
        .into_iter()
        .map(|record| to_ldif(record, ctx))
        .collect::<Result<Vec<_>>>()?;
    Ok(entries.join("\n"))
}

/// `name: value`, or `name:: base64` when the value is not a safe string
fn push_attr(entry: &mut String, name: &str, value: &str) {
    if is_safe_string(value) {
        entry.push_str(&format!("{}: {}\n", name, value));
    } else {
        entry.push_str(&format!(
            "{}:: {}\n",
            name,
            general_purpose::STANDARD.encode(value.as_bytes())
        ));
    }
}

fn is_safe_string(value: &str) -> bool {
    let bytes = value.as_bytes();
    if let Some(first) = bytes.first() {
        if matches!(first, b' ' | b':' | b'<') {
            return false;
        }
    }
    if bytes.last() == Some(&b' ') {
        return false;
    }
    bytes
        .iter()
        .all(|b| b.is_ascii() && !matches!(b, b'\0' | b'\n' | b'\r'))
}
