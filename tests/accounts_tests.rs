use space_catalog::{
    AppError,
    accounts::{find_user, provision_user},
    models::{CreateUserInput, Role},
    password::PasswordEncoder,
    repository::{Repository, SqliteRepository, UserStore},
    seed::{seed_default_users, seed_demo_catalog},
};

async fn store() -> SqliteRepository {
    let repo = SqliteRepository::connect("sqlite::memory:").await.unwrap();
    repo.migrate().await.unwrap();
    repo
}

fn encoder() -> PasswordEncoder {
    PasswordEncoder::with_cost(8, 1).unwrap()
}

#[tokio::test]
async fn test_provisioned_password_is_hashed_and_verifiable() {
    let repo = store().await;
    let passwords = encoder();

    let user = provision_user(
        &repo,
        &passwords,
        CreateUserInput {
            username: "  curator ".to_string(),
            password: "curator-pass".to_string(),
            role: Role::Staff,
        },
    )
    .await
    .unwrap();
    assert_eq!(user.username, "curator");

    let record = repo.find_user_by_username("curator").await.unwrap().unwrap();
    assert_ne!(record.password_hash, "curator-pass");
    assert!(passwords.verify("curator-pass", &record.password_hash).unwrap());
}

#[tokio::test]
async fn test_provision_validates_before_touching_store() {
    let repo = store().await;

    let err = provision_user(
        &repo,
        &encoder(),
        CreateUserInput {
            username: "x".to_string(),
            password: "short".to_string(),
            role: Role::Student,
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::ValidationFailed(_)));
    assert_eq!(repo.count_users().await.unwrap(), 0);
}

#[tokio::test]
async fn test_find_user_not_found() {
    let repo = store().await;
    assert!(matches!(
        find_user(&repo, 41).await,
        Err(AppError::NotFound { resource: "User", .. })
    ));
}

#[tokio::test]
async fn test_default_users_seed_once() {
    let repo = store().await;
    let passwords = encoder();

    assert_eq!(seed_default_users(&repo, &passwords).await.unwrap(), 3);
    assert_eq!(seed_default_users(&repo, &passwords).await.unwrap(), 0);

    let admin = repo.find_user_by_username("admin").await.unwrap().unwrap();
    assert_eq!(admin.role, Role::Admin);
    assert!(passwords.verify("admin123", &admin.password_hash).unwrap());
}

#[tokio::test]
async fn test_demo_catalog_seeds_once() {
    let repo = store().await;

    assert!(seed_demo_catalog(&repo).await.unwrap());
    assert!(!seed_demo_catalog(&repo).await.unwrap());

    assert_eq!(repo.planet_names().await.unwrap(), ["Earth", "Jupiter"]);
    let jupiter_moons = repo.list_moons(Some("jupiter")).await.unwrap();
    let names: Vec<_> = jupiter_moons.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["Io", "Europa"]);
}
