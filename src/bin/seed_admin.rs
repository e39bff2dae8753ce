use argon2::{Argon2, PasswordHasher};
use argon2::password_hash::{SaltString, rand_core::OsRng};

/// Quote a value as a SQL string literal, doubling any embedded quotes so
/// names like O'Brien produce valid SQL.
fn sql_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Prints the SQL to bootstrap the first admin account.
fn main() {
    let mut args = std::env::args().skip(1);
    let (Some(email), Some(name), Some(password)) = (args.next(), args.next(), args.next()) else {
        eprintln!("Usage: seed_admin <email> <name> <password>");
        std::process::exit(2);
    };

    let salt = SaltString::generate(&mut OsRng);
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string();

    println!(
        "INSERT INTO app_user (email, name, password_hash, role)\n\
         VALUES ({}, {}, {}, 1);",
        sql_literal(&email),
        sql_literal(&name),
        sql_literal(&phc),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_escape_embedded_quotes() {
        assert_eq!(sql_literal("plain"), "'plain'");
        assert_eq!(sql_literal("Miriam O'Brien"), "'Miriam O''Brien'");
        assert_eq!(sql_literal("''"), "''''''");
    }
}
