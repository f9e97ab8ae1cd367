//! Default archetypes and quiz inserted by the 1.0.0 step.

use crate::db::DbResult;
use rusqlite::{params, Connection, OptionalExtension};

struct ArchetypeSeed {
    name: &'static str,
    slug: &'static str,
    description: &'static str,
    color: &'static str,
    sort_order: i64,
}

const ARCHETYPES: &[ArchetypeSeed] = &[
    ArchetypeSeed {
        name: "The Ruler",
        slug: "ruler",
        description: "Takes charge of money with confidence and control",
        color: "#8B4513",
        sort_order: 1,
    },
    ArchetypeSeed {
        name: "The Innocent",
        slug: "innocent",
        description: "Trusts that money will work out naturally",
        color: "#87CEEB",
        sort_order: 2,
    },
    ArchetypeSeed {
        name: "The Warrior",
        slug: "warrior",
        description: "Fights for financial success and security",
        color: "#DC143C",
        sort_order: 3,
    },
    ArchetypeSeed {
        name: "The Fool",
        slug: "fool",
        description: "Takes financial risks with playful spontaneity",
        color: "#FFD700",
        sort_order: 4,
    },
    ArchetypeSeed {
        name: "The Victim",
        slug: "victim",
        description: "Feels powerless over financial circumstances",
        color: "#9370DB",
        sort_order: 5,
    },
    ArchetypeSeed {
        name: "The Magician",
        slug: "magician",
        description: "Transforms money situations with creativity",
        color: "#4B0082",
        sort_order: 6,
    },
    ArchetypeSeed {
        name: "The Tyrant",
        slug: "tyrant",
        description: "Controls money and others through fear",
        color: "#8B0000",
        sort_order: 7,
    },
    ArchetypeSeed {
        name: "The Martyr",
        slug: "martyr",
        description: "Sacrifices financial wellbeing for others",
        color: "#2F4F4F",
        sort_order: 8,
    },
];

pub const DEFAULT_QUIZ_SLUG: &str = "money-personality";

/// Number of archetypes inserted on a fresh install.
pub fn archetype_count() -> usize {
    ARCHETYPES.len()
}

/// Inserts the default archetypes and quiz; rows whose slug already exists
/// are left untouched.
pub(super) fn seed_defaults(conn: &Connection, archetypes: &str, quizzes: &str) -> DbResult<()> {
    for seed in ARCHETYPES {
        if slug_exists(conn, archetypes, seed.slug)? {
            continue;
        }
        conn.execute(
            &format!(
                "INSERT INTO {archetypes} (name, slug, description, color, sort_order)
                 VALUES (?1, ?2, ?3, ?4, ?5);"
            ),
            params![
                seed.name,
                seed.slug,
                seed.description,
                seed.color,
                seed.sort_order
            ],
        )?;
    }

    if !slug_exists(conn, quizzes, DEFAULT_QUIZ_SLUG)? {
        let settings = serde_json::json!({
            "show_progress": true,
            "allow_back": true,
            "randomize_questions": false,
            "time_limit": 0,
            "passing_score": 0,
            "result_display": "detailed",
        });
        conn.execute(
            &format!(
                "INSERT INTO {quizzes} (title, slug, description, settings)
                 VALUES (?1, ?2, ?3, ?4);"
            ),
            params![
                "Money Personality Quiz",
                DEFAULT_QUIZ_SLUG,
                "Discover your money archetype and transform your relationship with wealth",
                settings.to_string()
            ],
        )?;
    }
    Ok(())
}

/// Removes exactly the rows `seed_defaults` inserts.
pub(super) fn remove_defaults(conn: &Connection, archetypes: &str, quizzes: &str) -> DbResult<()> {
    for seed in ARCHETYPES {
        conn.execute(
            &format!("DELETE FROM {archetypes} WHERE slug = ?1;"),
            [seed.slug],
        )?;
    }
    conn.execute(
        &format!("DELETE FROM {quizzes} WHERE slug = ?1;"),
        [DEFAULT_QUIZ_SLUG],
    )?;
    Ok(())
}

fn slug_exists(conn: &Connection, table: &str, slug: &str) -> DbResult<bool> {
    let found = conn
        .query_row(
            &format!("SELECT id FROM {table} WHERE slug = ?1 LIMIT 1;"),
            [slug],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}
