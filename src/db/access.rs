//! Permission catalog, roles and the user directory.

use std::collections::BTreeSet;

use rusqlite::{params, OptionalExtension, Row};

use super::{DBError, Database};
use crate::models::{
    PermissionID, PermissionRecord, RoleID, RoleRecord, RoleRef, UserID, UserRecord,
};
use crate::utils::input_validation::Username;
use crate::utils::password_utils::PWHash;

const USER_COLUMNS: &str = "u.id, u.username, u.password_hash, u.full_name, u.role_id, r.name
     FROM users u LEFT JOIN roles r ON r.id = u.role_id";

pub struct NewRole<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub permissions: &'a [&'a str],
}

/// Fields written by a user update. `password: None` keeps the stored hash.
pub struct UserChanges<'a> {
    pub username: &'a Username,
    pub password: Option<&'a PWHash>,
    pub full_name: &'a str,
    pub role: Option<RoleID>,
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    let role_id: Option<RoleID> = row.get(4)?;
    let role_name: Option<String> = row.get(5)?;

    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        full_name: row.get(3)?,
        role: role_id.zip(role_name).map(|(id, name)| RoleRef { id, name }),
    })
}

impl Database {
    pub fn count_permissions(&self) -> Result<i64, DBError> {
        self.count("permissions")
    }

    pub fn count_roles(&self) -> Result<i64, DBError> {
        self.count("roles")
    }

    pub fn count_users(&self) -> Result<i64, DBError> {
        self.count("users")
    }

    /// Inserts the given permissions in one transaction.
    pub fn insert_permissions(&mut self, permissions: &[(&str, &str)]) -> Result<(), DBError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO permissions (name, description) VALUES (?1, ?2)")?;
            for (name, description) in permissions {
                stmt.execute(params![name, description])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_permissions(&self) -> Result<Vec<PermissionRecord>, DBError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description FROM permissions ORDER BY id")?;
        let permissions = stmt
            .query_map([], |row| {
                Ok(PermissionRecord {
                    id: row.get::<_, PermissionID>(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(permissions)
    }

    /// Creates a role granted with the named permissions.
    /// Names missing from the catalog are ignored.
    pub fn create_role(
        &mut self,
        name: &str,
        description: &str,
        permissions: &[&str],
    ) -> Result<RoleID, DBError> {
        let ids = self.create_roles(&[NewRole {
            name,
            description,
            permissions,
        }])?;
        Ok(ids[0])
    }

    /// Creates several roles in one transaction: all of them or none.
    pub fn create_roles(&mut self, roles: &[NewRole<'_>]) -> Result<Vec<RoleID>, DBError> {
        let tx = self.conn.transaction()?;
        let mut ids = Vec::with_capacity(roles.len());
        {
            let mut insert_role =
                tx.prepare("INSERT INTO roles (name, description) VALUES (?1, ?2)")?;
            let mut grant = tx.prepare(
                "INSERT OR IGNORE INTO role_permissions (role_id, permission_id)
                 SELECT ?1, id FROM permissions WHERE name = ?2",
            )?;

            for role in roles {
                let id = RoleID::new(insert_role.insert(params![role.name, role.description])?);
                for permission in role.permissions {
                    grant.execute(params![id, permission])?;
                }
                ids.push(id);
            }
        }
        tx.commit()?;
        Ok(ids)
    }

    pub fn get_role(&self, id: RoleID) -> Result<Option<RoleRecord>, DBError> {
        let role = self
            .conn
            .query_row(
                "SELECT id, name, description FROM roles WHERE id = ?1",
                params![id],
                |row| Ok((row.get::<_, RoleID>(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match role {
            Some((id, name, description)) => Ok(Some(RoleRecord {
                id,
                name,
                description,
                permissions: self.role_permissions(id)?,
            })),
            None => Ok(None),
        }
    }

    pub fn lookup_role(&self, name: &str) -> Result<Option<RoleRecord>, DBError> {
        let id = self
            .conn
            .query_row("SELECT id FROM roles WHERE name = ?1", params![name], |row| {
                row.get::<_, RoleID>(0)
            })
            .optional()?;

        match id {
            Some(id) => self.get_role(id),
            None => Ok(None),
        }
    }

    pub fn list_roles(&self) -> Result<Vec<RoleRecord>, DBError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description FROM roles ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, RoleID>(0)?, row.get::<_, String>(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, name, description)| {
                Ok(RoleRecord {
                    id,
                    name,
                    description,
                    permissions: self.role_permissions(id)?,
                })
            })
            .collect()
    }

    fn role_permissions(&self, role: RoleID) -> Result<BTreeSet<String>, DBError> {
        let mut stmt = self.conn.prepare(
            "SELECT p.name FROM role_permissions rp
             JOIN permissions p ON p.id = rp.permission_id
             WHERE rp.role_id = ?1",
        )?;
        let names = stmt
            .query_map(params![role], |row| row.get(0))?
            .collect::<Result<BTreeSet<String>, _>>()?;
        Ok(names)
    }

    /// Every `(role, permission)` grant, the policy of the access-control gate.
    pub fn role_grants(&self) -> Result<Vec<(String, String)>, DBError> {
        let mut stmt = self.conn.prepare(
            "SELECT r.name, p.name FROM role_permissions rp
             JOIN roles r ON r.id = rp.role_id
             JOIN permissions p ON p.id = rp.permission_id
             ORDER BY r.id, p.id",
        )?;
        let grants = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(grants)
    }

    pub fn insert_user(
        &self,
        username: &Username,
        password: &PWHash,
        full_name: Option<&str>,
        role: Option<RoleID>,
    ) -> Result<UserID, DBError> {
        self.conn.execute(
            "INSERT INTO users (username, password_hash, full_name, role_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![username, password, full_name, role],
        )?;
        Ok(UserID::new(self.conn.last_insert_rowid()))
    }

    pub fn get_user(&self, id: UserID) -> Result<Option<UserRecord>, DBError> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} WHERE u.id = ?1"),
                params![id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn lookup_username(&self, username: &str) -> Result<Option<UserRecord>, DBError> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} WHERE u.username = ?1"),
                params![username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> Result<Vec<UserRecord>, DBError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {USER_COLUMNS} ORDER BY u.id"))?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Returns `false` when no user has this id.
    pub fn update_user(&self, id: UserID, changes: &UserChanges<'_>) -> Result<bool, DBError> {
        let updated = match changes.password {
            Some(password) => self.conn.execute(
                "UPDATE users SET username = ?2, password_hash = ?3, full_name = ?4, role_id = ?5
                 WHERE id = ?1",
                params![id, changes.username, password, changes.full_name, changes.role],
            )?,
            None => self.conn.execute(
                "UPDATE users SET username = ?2, full_name = ?3, role_id = ?4 WHERE id = ?1",
                params![id, changes.username, changes.full_name, changes.role],
            )?,
        };
        Ok(updated == 1)
    }

    /// Returns `false` when no user has this id.
    pub fn delete_user(&self, id: UserID) -> Result<bool, DBError> {
        let deleted = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(deleted == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_db;
    use super::*;
    use crate::utils::password_utils::hash;

    fn seed_catalog(db: &mut Database) {
        db.insert_permissions(&[("turnos", "Access to turnos"), ("usuarios", "Access to usuarios")])
            .unwrap();
    }

    #[test]
    fn test_create_role_ignores_unknown_permissions() {
        let mut db = test_db();
        seed_catalog(&mut db);

        let role = db.create_role("recepcion", "Reception", &["turnos", "nope"]).unwrap();
        let record = db.get_role(role).unwrap().unwrap();

        assert_eq!(record.name, "recepcion");
        assert_eq!(record.permissions, BTreeSet::from(["turnos".to_string()]));
        assert_eq!(
            db.role_grants().unwrap(),
            vec![("recepcion".to_string(), "turnos".to_string())]
        );
    }

    #[test]
    fn test_duplicate_role_name_is_a_unique_violation() {
        let mut db = test_db();
        db.create_role("admin", "Administrator", &[]).unwrap();
        let err = db.create_role("admin", "Again", &[]).unwrap_err();
        assert!(err.is_unique_violation());
        assert_eq!(db.count_roles().unwrap(), 1);
    }

    #[test]
    fn test_user_round_trip_with_and_without_role() {
        let mut db = test_db();
        seed_catalog(&mut db);
        let role = db.create_role("admin", "Administrator", &["usuarios"]).unwrap();
        let password = hash("adminpass").unwrap();

        let admin = Username::try_from("admin").unwrap();
        let id = db.insert_user(&admin, &password, Some("Administrator"), Some(role)).unwrap();
        let stored = db.get_user(id).unwrap().unwrap();
        assert_eq!(stored.username, admin);
        assert_eq!(stored.role.map(|r| r.name), Some("admin".to_string()));

        let guest = Username::try_from("guest").unwrap();
        let id = db.insert_user(&guest, &password, None, None).unwrap();
        let stored = db.lookup_username("guest").unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.role, None);
    }

    #[test]
    fn test_update_user_keeps_password_when_absent() {
        let db = test_db();
        let password = hash("first").unwrap();
        let username = Username::try_from("reception").unwrap();
        let id = db.insert_user(&username, &password, None, None).unwrap();

        let renamed = Username::try_from("frontdesk").unwrap();
        let changes = UserChanges {
            username: &renamed,
            password: None,
            full_name: "Front Desk",
            role: None,
        };
        assert!(db.update_user(id, &changes).unwrap());

        let stored = db.get_user(id).unwrap().unwrap();
        assert_eq!(stored.username, renamed);
        assert_eq!(stored.password.as_str(), password.as_str());
        assert!(!db.update_user(UserID::new(99), &changes).unwrap());
    }

    #[test]
    fn test_delete_user_removes_exactly_one_row() {
        let db = test_db();
        let password = hash("pw").unwrap();
        let a = db
            .insert_user(&Username::try_from("alice").unwrap(), &password, None, None)
            .unwrap();
        let b = db
            .insert_user(&Username::try_from("bob_user").unwrap(), &password, None, None)
            .unwrap();

        assert!(db.delete_user(a).unwrap());
        assert!(!db.delete_user(a).unwrap());
        assert_eq!(db.count_users().unwrap(), 1);
        assert!(db.get_user(b).unwrap().is_some());
    }
}
