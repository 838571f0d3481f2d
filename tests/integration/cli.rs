use spacekeep::tooling::cli::{BlobCommands, CliContext, Commands, SecretsCommands};
use std::fs;
use tempfile::TempDir;

fn init_space(temp: &TempDir) -> CliContext {
    let cli = CliContext::new(temp.path().to_path_buf(), None).unwrap();
    cli.execute(&Commands::Init {
        id: Some("cli-space".to_string()),
        name: None,
    })
    .unwrap();
    cli
}

#[test]
fn init_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let cli = init_space(&temp);
    let again = cli
        .execute(&Commands::Init {
            id: Some("different".to_string()),
            name: None,
        })
        .unwrap();
    assert!(again.contains("cli-space"));
    assert!(temp.path().join("space.md").is_file());
}

#[test]
fn import_then_list_ops_as_jsonl() {
    let temp = TempDir::new().unwrap();
    let cli = init_space(&temp);

    let input = temp.path().join("incoming.jsonl");
    fs::write(
        &input,
        "[\"m\",1,\"v1\",null]\n\"[\"p\",2,\"v1\",\"tags\",[\"a\",\"b\"]]\"\nnot json\n",
    )
    .unwrap();

    let imported = cli
        .execute(&Commands::Import {
            tree_id: "t1".to_string(),
            origin: "peer".to_string(),
            file: input,
        })
        .unwrap();
    assert!(imported.contains("Imported 2"));

    let listed = cli
        .execute(&Commands::Ops {
            tree_id: "t1".to_string(),
            format: "jsonl".to_string(),
            origin: None,
        })
        .unwrap();
    assert_eq!(
        listed,
        "[\"m\",1,\"v1\",null]\n[\"p\",2,\"v1\",\"tags\",[\"a\",\"b\"]]"
    );

    let table = cli
        .execute(&Commands::Ops {
            tree_id: "t1".to_string(),
            format: "text".to_string(),
            origin: None,
        })
        .unwrap();
    assert!(table.contains("2@peer"));
}

#[test]
fn jsonl_listing_is_per_origin() {
    let temp = TempDir::new().unwrap();
    let cli = init_space(&temp);

    let shards = [
        ("peer-a", "[\"m\",1,\"a\",null]\n"),
        ("peer-b", "[\"m\",1,\"b\",null]\n"),
    ];
    for (origin, line) in shards {
        let input = temp.path().join(format!("{origin}.jsonl"));
        fs::write(&input, line).unwrap();
        cli.execute(&Commands::Import {
            tree_id: "t1".to_string(),
            origin: origin.to_string(),
            file: input,
        })
        .unwrap();
    }

    let mixed = cli.execute(&Commands::Ops {
        tree_id: "t1".to_string(),
        format: "jsonl".to_string(),
        origin: None,
    });
    let message = mixed.unwrap_err().to_string();
    assert!(message.contains("peer-a, peer-b"));

    let only_b = cli
        .execute(&Commands::Ops {
            tree_id: "t1".to_string(),
            format: "jsonl".to_string(),
            origin: Some("peer-b".to_string()),
        })
        .unwrap();
    assert_eq!(only_b, "[\"m\",1,\"b\",null]");

    let table = cli
        .execute(&Commands::Ops {
            tree_id: "t1".to_string(),
            format: "text".to_string(),
            origin: None,
        })
        .unwrap();
    assert!(table.contains("1@peer-a"));
    assert!(table.contains("1@peer-b"));
}

#[test]
fn import_rejects_path_like_ids() {
    let temp = TempDir::new().unwrap();
    let cli = init_space(&temp);
    let input = temp.path().join("incoming.jsonl");
    fs::write(&input, "[\"m\",1,\"v1\",null]\n").unwrap();

    let result = cli.execute(&Commands::Import {
        tree_id: "../escape".to_string(),
        origin: "peer".to_string(),
        file: input,
    });
    assert!(result.is_err());
}

#[test]
fn blob_put_get_exists() {
    let temp = TempDir::new().unwrap();
    let cli = init_space(&temp);
    let src = temp.path().join("note.txt");
    fs::write(&src, "hello blob").unwrap();

    let id = cli
        .execute(&Commands::Blob {
            command: BlobCommands::Put {
                file: src,
                mime_type: Some("text/plain".to_string()),
            },
        })
        .unwrap();
    assert!(id.starts_with("sha256:"));

    let exists = cli
        .execute(&Commands::Blob {
            command: BlobCommands::Exists { id: id.clone() },
        })
        .unwrap();
    assert_eq!(exists, "true");

    let out = temp.path().join("copy.txt");
    cli.execute(&Commands::Blob {
        command: BlobCommands::Get {
            id,
            out: out.clone(),
        },
    })
    .unwrap();
    assert_eq!(fs::read_to_string(out).unwrap(), "hello blob");

    let bad = cli.execute(&Commands::Blob {
        command: BlobCommands::Exists {
            id: "sha256:nothex".to_string(),
        },
    });
    assert!(bad.is_err());
}

#[test]
fn secrets_set_then_list_masks_values() {
    let temp = TempDir::new().unwrap();
    let cli = init_space(&temp);

    cli.execute(&Commands::Secrets {
        command: SecretsCommands::Set {
            key: "token".to_string(),
            value: "s3cr3t".to_string(),
        },
    })
    .unwrap();

    let masked = cli
        .execute(&Commands::Secrets {
            command: SecretsCommands::List { show_values: false },
        })
        .unwrap();
    assert!(masked.contains("token"));
    assert!(!masked.contains("s3cr3t"));

    let shown = cli
        .execute(&Commands::Secrets {
            command: SecretsCommands::List { show_values: true },
        })
        .unwrap();
    assert!(shown.contains("s3cr3t"));
}
