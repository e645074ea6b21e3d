//! Account field validation
//!
//! Usernames are Ghana-focused: public institutions, politicians, brands,
//! celebrities and system names cannot be claimed.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::utils::constants::MIN_PASSWORD_LEN;

lazy_static! {
    /// 3-25 chars of [a-z0-9._], alphanumeric at both ends.
    /// Consecutive separators are checked separately (no lookahead in `regex`).
    static ref USERNAME_REGEX: Regex =
        Regex::new(r"^[a-z0-9][a-z0-9._]{1,23}[a-z0-9]$").expect("valid username regex");

    /// 0XXXXXXXXX or +233XXXXXXXXX on the 2x / 5x mobile ranges
    static ref GH_PHONE_REGEX: Regex =
        Regex::new(r"^(?:0|\+233)(2[0-9]|5[0-9])\d{7}$").expect("valid phone regex");

    static ref RESERVED_USERNAMES: HashSet<&'static str> = [
        // Government / institutions / politics
        "ghanagov", "ghana", "ghanapolice", "gaf", "ecg", "ecgghana",
        "attorneygeneral", "parliamentgh", "nationalsecuritygh",
        "ghanacybersecurity", "mocgh",
        // Presidents / major political figures
        "nanaakufoaddo", "johndramanimahama", "bawumia", "jdm", "johnmahama",
        // MPs / prominent political voices
        "samgeorge", "samuelgeorge", "harunai",
        // Major brands & telcos
        "mtn", "mtnghana", "vodafone", "vodafoneghana", "airteltigo", "melcom",
        "kasapreko", "guinnessghana", "goldfields", "gcb", "ecobank", "ecobankghana",
        // Media houses
        "citinewsroom", "adomtv", "utvghana", "joynews", "ghonetv",
        // Musicians / entertainment
        "sarkodie", "shattawale", "stonebwoy", "blacksherrif", "blacko",
        "kingpromise", "kidi", "kuamieugene", "kwesiarthur",
        // Football
        "asamoahgyan", "babyjet", "michaelessien", "andreayew", "thomaspartey",
        // Faith leaders
        "mensahotabil", "archbishopduncanwilliams", "bishopdag",
        // Traditional titles
        "asantehene", "otumfuo", "gaaman", "mantse", "okyehene", "nananom",
        // System / sensitive names
        "admin", "root", "system", "support", "help", "moderator",
        "administrator", "staff", "api", "backend", "frontend", "dashboard",
        "login", "logout", "signup", "settings", "superuser", "owner",
        "official", "verified", "koboateng",
    ]
    .into_iter()
    .collect();

    static ref COMMON_PASSWORDS: HashSet<&'static str> = [
        "password", "password1", "password123", "12345678", "123456789",
        "1234567890", "qwerty123", "qwertyuiop", "iloveyou", "11111111",
        "00000000", "abc12345", "letmein1", "welcome1", "admin123",
        "football", "sunshine", "princess", "baseball", "trustno1",
    ]
    .into_iter()
    .collect();
}

/// Normalize and validate a username, returning the stored form
pub fn validate_username(raw: &str) -> AppResult<String> {
    let username = raw.trim().to_lowercase();

    if is_reserved_username(&username) {
        return Err(AppError::new(
            ErrorCode::UsernameReserved,
            "This username is reserved and cannot be used.",
        ));
    }

    let has_double_separator = username
        .as_bytes()
        .windows(2)
        .any(|w| matches!(w[0], b'.' | b'_') && matches!(w[1], b'.' | b'_'));

    if !USERNAME_REGEX.is_match(&username) || has_double_separator {
        return Err(AppError::new(
            ErrorCode::UsernameInvalid,
            "Invalid username. Use 3-25 lowercase characters: letters, numbers, \
             dots or underscores. Cannot start or end with dot/underscore, \
             and no consecutive dots/underscores.",
        ));
    }

    Ok(username)
}

/// Whether a (normalized) username is on the reserved list
pub fn is_reserved_username(username: &str) -> bool {
    RESERVED_USERNAMES.contains(username)
}

/// Strip spaces and validate a Ghana phone number
pub fn validate_ghana_phone(raw: &str) -> AppResult<String> {
    let phone: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    if !GH_PHONE_REGEX.is_match(&phone) {
        return Err(AppError::new(
            ErrorCode::PhoneInvalid,
            "Enter a valid Ghana phone number starting with 0 or +233 followed by 9 digits.",
        ));
    }

    Ok(phone)
}

/// Password strength rules
pub fn validate_password(password: &str, username: &str) -> AppResult<()> {
    let weak = |msg: &str| Err(AppError::new(ErrorCode::PasswordWeak, msg));

    if password.chars().count() < MIN_PASSWORD_LEN {
        return weak("This password is too short. It must contain at least 8 characters.");
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return weak("This password is entirely numeric.");
    }
    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(lowered.as_str()) {
        return weak("This password is too common.");
    }
    if !username.is_empty() && lowered.contains(&username.to_lowercase()) {
        return weak("The password is too similar to the username.");
    }
    Ok(())
}
