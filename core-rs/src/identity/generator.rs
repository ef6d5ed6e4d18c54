//! Identity populations used by the scenarios
//!
//! - [`incremental_population`]: `user0..userN`, user `i` expiring in `i` days
//! - [`staleness_population`]: a fixed number of users per [`ExpirationStatus`],
//!   plus soon-expiring users whose last authentication is long past
//! - [`BatchPlan`]: the large mixed batch (no password, gradual expiry,
//!   unicode names, unicode and multiple mail addresses)

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use super::{ExpirationStatus, IdentityRecord, IdentitySet};
use crate::clock::offset_instant;
use crate::errors::Result;

const NAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

const UNICODE_ALPHABETS: [&str; 5] = [
    "աբգդեզէըթժիլխծկհձղճմ",
    "aâêbcçddheèëfggjhijľščťřžýáíéôpqrsśtuúvxyzź",
    "غظضذخثتشرقصفعسنملكيطحزوهدجبأ",
    "абвгдеёжзийклмнопрстуфхцчшщъыьэюя",
    "אבגדהוזחטיכמנסעפצק",
];

/// `user0 .. user{count-1}`, user `i` expiring exactly `i` days after `now`
///
/// Every user is named "test user" and gets `user{i}@{domain}` so delivered
/// mail can be matched back to the login.
pub fn incremental_population(count: u32, now: DateTime<Utc>, domain: &str) -> Result<IdentitySet> {
    let mut set = IdentitySet::new();
    for i in 0..count {
        let login = format!("user{}", i);
        let record = IdentityRecord::new(login.clone())
            .with_names("test", "user")
            .with_mail(format!("{}@{}", login, domain))
            .expiring_in(now, i64::from(i));
        set.insert(record)?;
    }
    Ok(set)
}

/// Random lowercase name of `len` letters
pub fn random_name<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| NAME_ALPHABET[rng.gen_range(0..NAME_ALPHABET.len())] as char)
        .collect()
}

/// `len` distinct characters drawn from one randomly chosen non-latin alphabet
pub fn random_unicode_string<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    let alphabet: Vec<char> = UNICODE_ALPHABETS[rng.gen_range(0..UNICODE_ALPHABETS.len())]
        .chars()
        .collect();
    alphabet.choose_multiple(rng, len).collect()
}

/// Users for stale-account processing
///
/// For each index `i < per_status`:
/// `ne_user_i` (future), `eg_user_i` (grace), `se_user_i` (soon),
/// `e_user_i` (expired), and `sei_user_i` which expires soon but last
/// authenticated at the expired offset.
pub fn staleness_population<R: Rng + ?Sized>(
    per_status: usize,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<IdentitySet> {
    let groups = [
        ("ne_user", ExpirationStatus::Future, false),
        ("eg_user", ExpirationStatus::Grace, false),
        ("se_user", ExpirationStatus::Soon, false),
        ("e_user", ExpirationStatus::Expired, false),
        ("sei_user", ExpirationStatus::Soon, true),
    ];

    let mut set = IdentitySet::new();
    for i in 0..per_status {
        for (prefix, status, inactive) in groups {
            let mut record = IdentityRecord::new(format!("{}_{}", prefix, i))
                .with_names(random_name(rng, 5), random_name(rng, 5))
                .expiring_in(now, status.canonical_offset());
            if inactive {
                record = record.last_authenticated_at(offset_instant(
                    now,
                    ExpirationStatus::Expired.canonical_offset(),
                ));
            }
            set.insert(record)?;
        }
    }
    Ok(set)
}

/// Shape of the large mixed batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub users_in_group: usize,
    pub max_days: usize,
    /// Offset used by the remainder and unicode groups
    pub fixed_offset_days: i64,
}

impl Default for BatchPlan {
    fn default() -> Self {
        Self {
            users_in_group: 100,
            max_days: 30,
            fixed_offset_days: 7,
        }
    }
}

/// Generated batch and its group sizes
#[derive(Debug, Clone)]
pub struct UserBatch {
    pub identities: IdentitySet,
    pub without_password: usize,
    pub gradual: usize,
    pub remainder: usize,
    pub unicode_names: usize,
    pub unicode_mail: usize,
    pub multi_mail: usize,
}

impl BatchPlan {
    pub fn users_per_day(&self) -> usize {
        if self.max_days == 0 {
            0
        } else {
            self.users_in_group / self.max_days
        }
    }

    /// Users left over after spreading the group over `max_days`
    pub fn remainder(&self) -> usize {
        if self.max_days == 0 {
            self.users_in_group
        } else {
            self.users_in_group % self.max_days
        }
    }

    pub fn generate<R: Rng + ?Sized>(
        &self,
        now: DateTime<Utc>,
        domain: &str,
        password: &str,
        rng: &mut R,
    ) -> Result<UserBatch> {
        let mut identities = IdentitySet::new();
        let mail_for = |login: &str| format!("{}@{}", login, domain);

        for i in 0..self.users_in_group {
            let login = format!("user_wo_pass_{}", i);
            identities.insert(IdentityRecord::new(login.clone()).with_mail(mail_for(&login)))?;
        }

        let users_per_day = self.users_per_day();
        for day in 0..self.max_days {
            let offset = (self.max_days - day) as i64;
            for i in 0..users_per_day {
                let login = format!("user_with_pass_{}_{}", day, i);
                identities.insert(
                    IdentityRecord::new(login.clone())
                        .with_mail(mail_for(&login))
                        .with_password(password)
                        .expiring_in(now, offset),
                )?;
            }
        }

        let remainder = self.remainder();
        for i in 0..remainder {
            let login = format!("user_with_pass_extra_{}", i);
            identities.insert(
                IdentityRecord::new(login.clone())
                    .with_mail(mail_for(&login))
                    .with_password(password)
                    .expiring_in(now, self.fixed_offset_days),
            )?;
        }

        for i in 0..self.users_in_group {
            let login = format!("{}_{}", random_unicode_string(rng, 6), i);
            identities.insert(
                IdentityRecord::new(login.clone())
                    .with_mail(mail_for(&login))
                    .with_password(password)
                    .expiring_in(now, self.fixed_offset_days),
            )?;
        }

        for i in 0..self.users_in_group {
            let login = format!("user_with_unicode_name_{}", i);
            let unicode_mail = format!("{}.{}@{}", random_unicode_string(rng, 6), i, domain);
            identities.insert(
                IdentityRecord::new(login.clone())
                    .with_mail(mail_for(&login))
                    .with_mail(unicode_mail)
                    .with_password(password)
                    .expiring_in(now, self.fixed_offset_days),
            )?;
        }

        for i in 0..self.users_in_group {
            let login = format!("user_multi_emails_{}", i);
            identities.insert(
                IdentityRecord::new(login.clone())
                    .with_mail(mail_for(&login))
                    .with_mail(format!("{}_1@{}", login, domain))
                    .with_mail(format!("{}_2@{}", login, domain))
                    .with_password(password)
                    .expiring_in(now, self.fixed_offset_days),
            )?;
        }

        Ok(UserBatch {
            identities,
            without_password: self.users_in_group,
            gradual: users_per_day * self.max_days,
            remainder,
            unicode_names: self.users_in_group,
            unicode_mail: self.users_in_group,
            multi_mail: self.users_in_group,
        })
    }
}
