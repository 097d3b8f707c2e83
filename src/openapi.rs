//! Static OpenAPI 3 description of the REST surface.

use serde_json::{Value, json};

fn error_response(description: &str) -> Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/ErrorResponse" }
            }
        }
    })
}

fn json_response(description: &str, schema: &str) -> Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": format!("#/components/schemas/{schema}") }
            }
        }
    })
}

fn json_body(schema: &str) -> Value {
    json!({
        "required": true,
        "content": {
            "application/json": {
                "schema": { "$ref": format!("#/components/schemas/{schema}") }
            }
        }
    })
}

fn id_param() -> Value {
    json!({ "in": "path", "name": "id", "required": true, "schema": { "type": "integer" } })
}

fn schemas() -> Value {
    let status = json!({ "type": "string", "enum": ["available", "reserved"] });
    json!({
        "Book": {
            "type": "object",
            "properties": {
                "id": { "type": "integer", "example": 1 },
                "title": { "type": "string", "example": "Don Quijote de la Mancha" },
                "author": { "type": "string", "example": "Miguel de Cervantes" },
                "year": { "type": "integer", "example": 1605 },
                "status": status
            },
            "required": ["id", "title", "author", "year", "status"]
        },
        "CreateBook": {
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "author": { "type": "string" },
                "year": { "type": "integer" },
                "status": status
            },
            "required": ["title", "author", "year"]
        },
        "UpdateBook": {
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "author": { "type": "string" },
                "year": { "type": "integer" },
                "status": status
            }
        },
        "PaginatedBooks": {
            "type": "object",
            "properties": {
                "items": { "type": "array", "items": { "$ref": "#/components/schemas/Book" } },
                "page": { "type": "integer", "example": 1 },
                "limit": { "type": "integer", "example": 10 },
                "total": { "type": "integer", "example": 42 },
                "pages": { "type": "integer", "example": 5 }
            },
            "required": ["items", "page", "limit", "total", "pages"]
        },
        "Register": {
            "type": "object",
            "properties": {
                "email": { "type": "string", "format": "email" },
                "password": { "type": "string", "minLength": 8 }
            },
            "required": ["email", "password"]
        },
        "Login": {
            "type": "object",
            "properties": {
                "email": { "type": "string", "format": "email" },
                "password": { "type": "string" }
            },
            "required": ["email", "password"]
        },
        "UserCreated": {
            "type": "object",
            "properties": {
                "id": { "type": "integer" },
                "email": { "type": "string" }
            }
        },
        "TokenResponse": {
            "type": "object",
            "properties": { "token": { "type": "string" } },
            "required": ["token"]
        },
        "ErrorResponse": {
            "type": "object",
            "properties": { "error": { "type": "string" } },
            "required": ["error"]
        }
    })
}

/// Build the OpenAPI document served at `/api/docs/openapi.json`.
#[must_use]
pub fn document() -> Value {
    let secured = json!([{ "bearerAuth": [] }]);
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Book Catalog API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Book catalog with JWT authentication"
        },
        "components": {
            "securitySchemes": {
                "bearerAuth": { "type": "http", "scheme": "bearer", "bearerFormat": "JWT" }
            },
            "schemas": schemas()
        },
        "paths": {
            "/api/auth/register": {
                "post": {
                    "tags": ["Auth"],
                    "summary": "Register a user",
                    "requestBody": json_body("Register"),
                    "responses": {
                        "201": json_response("Created", "UserCreated"),
                        "400": error_response("Invalid input or email already registered")
                    }
                }
            },
            "/api/auth/login": {
                "post": {
                    "tags": ["Auth"],
                    "summary": "Log in",
                    "requestBody": json_body("Login"),
                    "responses": {
                        "200": json_response("Session token", "TokenResponse"),
                        "401": error_response("Invalid credentials"),
                        "429": error_response("Too many login attempts from this client address")
                    }
                }
            },
            "/api/books": {
                "get": {
                    "tags": ["Books"],
                    "summary": "List books",
                    "parameters": [
                        { "in": "query", "name": "page", "schema": { "type": "integer", "minimum": 1 } },
                        { "in": "query", "name": "limit", "schema": { "type": "integer", "minimum": 1, "maximum": 100 } },
                        { "in": "query", "name": "q", "schema": { "type": "string" }, "description": "Case-insensitive match on title or author" },
                        { "in": "query", "name": "status", "schema": { "type": "string", "enum": ["available", "reserved"] } },
                        { "in": "query", "name": "sort", "schema": { "type": "string" }, "description": "Comma-separated fields, '-' for descending, e.g. year,-title" }
                    ],
                    "responses": {
                        "200": json_response("A page of books", "PaginatedBooks"),
                        "400": error_response("Invalid listing parameters")
                    }
                },
                "post": {
                    "tags": ["Books"],
                    "summary": "Create a book",
                    "security": secured,
                    "requestBody": json_body("CreateBook"),
                    "responses": {
                        "201": json_response("Created", "Book"),
                        "400": error_response("Missing required fields"),
                        "401": error_response("Unauthorized")
                    }
                }
            },
            "/api/books/{id}": {
                "get": {
                    "tags": ["Books"],
                    "summary": "Get a book",
                    "parameters": [id_param()],
                    "responses": {
                        "200": json_response("OK", "Book"),
                        "404": error_response("Not found")
                    }
                },
                "put": {
                    "tags": ["Books"],
                    "summary": "Update a book",
                    "security": secured,
                    "parameters": [id_param()],
                    "requestBody": json_body("UpdateBook"),
                    "responses": {
                        "200": json_response("Updated", "Book"),
                        "400": error_response("Invalid field values"),
                        "401": error_response("Unauthorized"),
                        "404": error_response("Not found")
                    }
                },
                "delete": {
                    "tags": ["Books"],
                    "summary": "Delete a book",
                    "security": secured,
                    "parameters": [id_param()],
                    "responses": {
                        "204": { "description": "Deleted" },
                        "401": error_response("Unauthorized"),
                        "404": error_response("Not found")
                    }
                }
            }
        }
    })
}
