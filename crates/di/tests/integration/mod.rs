mod resolution_properties;
mod scopes_and_cleanup;
