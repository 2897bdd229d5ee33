//! Shared schema fixtures for rowforge tests: small hand-built tables that
//! mirror what the loader would produce from a live database.

use rowforge_core::schema::{Constraint, Field, Table};

pub fn int_field(name: &str) -> Field {
    Field {
        column_name: name.to_string(),
        data_type: "int".to_string(),
        ..Field::default()
    }
}

pub fn varchar_field(name: &str, max: i64) -> Field {
    Field {
        column_name: name.to_string(),
        data_type: "varchar".to_string(),
        char_max_length: Some(max),
        ..Field::default()
    }
}

pub fn auto_increment_pk(name: &str) -> Field {
    Field {
        column_name: name.to_string(),
        data_type: "int".to_string(),
        auto_increment: true,
        column_key: "PRI".to_string(),
        ..Field::default()
    }
}

/// `customers(id, email, name)` with an auto-increment key.
pub fn customers_table() -> Table {
    Table {
        schema: "test".to_string(),
        name: "customers".to_string(),
        fields: vec![
            auto_increment_pk("id"),
            varchar_field("email", 255),
            varchar_field("name", 100),
        ],
        constraints: Vec::new(),
    }
}

/// `orders(id, customer_id, amount)` referencing `customers.id`.
pub fn orders_table() -> Table {
    let mut constraint = Constraint {
        name: "fk_orders_customer".to_string(),
        referenced_schema: "test".to_string(),
        referenced_table: "customers".to_string(),
        columns: vec!["customer_id".to_string()],
        referenced_columns: vec!["id".to_string()],
        ..Constraint::default()
    };
    constraint.fields = vec![int_field("customer_id")];
    constraint.referenced_fields = vec![auto_increment_pk("id")];

    Table {
        schema: "test".to_string(),
        name: "orders".to_string(),
        fields: vec![
            auto_increment_pk("id"),
            int_field("customer_id"),
            Field {
                column_name: "amount".to_string(),
                data_type: "decimal".to_string(),
                numeric_precision: Some(10),
                numeric_scale: Some(2),
                ..Field::default()
            },
        ],
        constraints: vec![constraint],
    }
}

/// A two-column foreign key: `shipments(order_id, order_line)` referencing
/// `order_lines(order_id, line_no)`.
pub fn compound_fk_table() -> Table {
    let mut constraint = Constraint {
        name: "fk_shipments_line".to_string(),
        referenced_schema: "test".to_string(),
        referenced_table: "order_lines".to_string(),
        columns: vec!["order_id".to_string(), "order_line".to_string()],
        referenced_columns: vec!["order_id".to_string(), "line_no".to_string()],
        ..Constraint::default()
    };
    constraint.fields = vec![int_field("order_id"), int_field("order_line")];
    constraint.referenced_fields = vec![int_field("order_id"), int_field("line_no")];

    Table {
        schema: "test".to_string(),
        name: "shipments".to_string(),
        fields: vec![
            auto_increment_pk("id"),
            int_field("order_id"),
            int_field("order_line"),
        ],
        constraints: vec![constraint],
    }
}

/// `tickets(id, status, note)` with an enum status column.
pub fn enum_table() -> Table {
    Table {
        schema: "test".to_string(),
        name: "tickets".to_string(),
        fields: vec![
            auto_increment_pk("id"),
            Field {
                column_name: "status".to_string(),
                data_type: "enum".to_string(),
                enum_values: vec![
                    "open".to_string(),
                    "closed".to_string(),
                    "pending".to_string(),
                ],
                ..Field::default()
            },
            Field {
                column_name: "note".to_string(),
                data_type: "text".to_string(),
                is_nullable: true,
                ..Field::default()
            },
        ],
        constraints: Vec::new(),
    }
}
