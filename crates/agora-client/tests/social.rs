mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use agora_client::events::Events;
use agora_client::feed::{self, PostFeed};
use agora_client::follow::FollowGraph;
use agora_client::forums::Forums;
use agora_client::posts::Posts;
use agora_client::users::Users;
use agora_client::{ClientError, SessionContext};
use agora_gateway::{Backend, GatewayError};
use agora_types::Collection;
use agora_types::api::{NewEvent, NewForum, NewPost, UpdateEvent, UpdatePost, UpdateUser};
use agora_types::models::User;

use common::{FlakyBackend, config, embedded, new_user, signed_up, upload, user_id};

async fn stored_user(ctx: &SessionContext, id: &str) -> User {
    ctx.backend()
        .get_document(Collection::Users, id)
        .await
        .unwrap()
        .decode()
        .unwrap()
}

#[tokio::test]
async fn sign_up_creates_profile_and_session() {
    let store = embedded();
    let ctx = signed_up(Arc::new(store.connect()), "ana").await;

    let me = ctx.current_user().await.unwrap();
    assert_eq!(me.username, "ana");
    assert!(me.image_url.contains("/avatars/initials?name="));
    assert!(me.followers.is_empty() && me.following.is_empty());

    // duplicate email is refused by the backend
    let again = SessionContext::new(Arc::new(store.connect()), config());
    let err = again.sign_up(new_user("ana")).await.unwrap_err();
    assert!(matches!(err, ClientError::Gateway(GatewayError::Conflict(_))));

    ctx.sign_out().await.unwrap();
    assert!(!ctx.is_authenticated().await);
    assert!(ctx.refresh().await.unwrap().is_none());

    let back = ctx.sign_in("ana@example.com", "password123").await.unwrap();
    assert_eq!(back.id, me.id);
}

#[tokio::test]
async fn invalid_sign_up_is_rejected_locally() {
    let ctx = SessionContext::new(Arc::new(embedded()), config());
    let mut user = new_user("ana");
    user.nationality = "Atlantis".into();
    assert!(matches!(ctx.sign_up(user).await, Err(ClientError::Validation(_))));
}

#[tokio::test]
async fn password_recovery_round_trip() {
    let store = embedded();
    let ctx = signed_up(Arc::new(store.connect()), "ana").await;
    ctx.sign_out().await.unwrap();

    let token = ctx.forgot_password("ana@example.com").await.unwrap();
    assert!(token.url.starts_with(&config().recovery_url));

    ctx.reset_password(&token.user_id, &token.secret, "new-password-1", "new-password-1")
        .await
        .unwrap();
    assert!(ctx.sign_in("ana@example.com", "password123").await.is_err());
    ctx.sign_in("ana@example.com", "new-password-1").await.unwrap();
}

#[tokio::test]
async fn concurrent_follows_keep_set_semantics() {
    let store = embedded();
    let ana = signed_up(Arc::new(store.connect()), "ana").await;
    let bora = signed_up(Arc::new(store.connect()), "bora").await;
    let (a, b) = (user_id(&ana).await, user_id(&bora).await);

    let graph = FollowGraph::new(ana.clone());
    let (first, second) = tokio::join!(graph.follow(&a, &b), graph.follow(&a, &b));
    first.unwrap();
    second.unwrap();

    let a_doc = stored_user(&ana, &a).await;
    let b_doc = stored_user(&ana, &b).await;
    assert_eq!(a_doc.following.iter().filter(|id| **id == b).count(), 1);
    assert_eq!(b_doc.followers.iter().filter(|id| **id == a).count(), 1);
    assert!(graph.is_following(&a, &b).await.unwrap());
    assert!(ana.current_user().await.unwrap().follows(&b));

    let stats = graph.stats(&b).await.unwrap();
    assert_eq!(stats.followers, 1);
    assert_eq!(stats.following, 0);

    graph.unfollow(&a, &b).await.unwrap();
    assert!(!graph.is_following(&a, &b).await.unwrap());
    assert!(stored_user(&ana, &b).await.followers.is_empty());
}

#[tokio::test]
async fn failed_follow_reverts_the_flag_only() {
    let store = embedded();
    let flaky = FlakyBackend::new(store.connect());
    let ana = signed_up(flaky.clone(), "ana").await;
    let bora = signed_up(Arc::new(store.connect()), "bora").await;
    let (a, b) = (user_id(&ana).await, user_id(&bora).await);

    let graph = FollowGraph::new(ana.clone());
    flaky.fail_updates_of(Some(b.as_str()));
    assert!(graph.follow(&a, &b).await.is_err());

    // the flag is back to "not following" even though the first write landed
    assert!(!graph.is_following(&a, &b).await.unwrap());
    assert!(stored_user(&ana, &a).await.follows(&b));
    assert!(stored_user(&ana, &b).await.followers.is_empty());

    // a fresh view reads the stored graph
    assert!(FollowGraph::new(ana.clone()).is_following(&a, &b).await.unwrap());

    assert!(matches!(graph.follow(&a, &a).await, Err(ClientError::Validation(_))));
}

#[tokio::test]
async fn post_feed_pages_are_disjoint() {
    let store = embedded();
    let ana = signed_up(Arc::new(store.connect()), "ana").await;
    let a = user_id(&ana).await;
    let posts = Posts::new(ana.clone());

    for i in 0..7 {
        posts
            .create(NewPost {
                user_id: a.clone(),
                caption: format!("post {}", i),
                file: upload("p.png"),
                location: None,
                tags: Some("travel, food".into()),
            })
            .await
            .unwrap();
    }

    let mut feed = PostFeed::new(ana.clone());
    let mut seen = Vec::new();
    while feed.has_next_page() {
        let page = feed.next_page().await.unwrap();
        assert!(page.len() <= 3);
        seen.extend(page.into_iter().map(|p| p.id));
    }
    assert_eq!(seen.len(), 7);
    let mut unique = seen.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 7);

    feed.reset();
    assert_eq!(feed.next_page().await.unwrap().len(), 3);

    assert_eq!(feed::recent_posts(&ana).await.unwrap().len(), 7);
    assert_eq!(feed::search_posts(&ana, "POST 3").await.unwrap().len(), 1);
}

#[tokio::test]
async fn post_feed_survives_deletion_of_its_cursor_post() {
    let store = embedded();
    let ana = signed_up(Arc::new(store.connect()), "ana").await;
    let a = user_id(&ana).await;
    let posts = Posts::new(ana.clone());
    for i in 0..7 {
        posts
            .create(NewPost {
                user_id: a.clone(),
                caption: format!("post {}", i),
                file: upload("p.png"),
                location: None,
                tags: None,
            })
            .await
            .unwrap();
    }

    let mut feed = PostFeed::new(ana.clone());
    let first = feed.next_page().await.unwrap();
    assert_eq!(first.len(), 3);

    // the last post shown, and the one before it, are deleted from the feed
    for post in &first[1..] {
        posts.delete(&post.id).await.unwrap();
    }

    let mut rest = Vec::new();
    while feed.has_next_page() {
        rest.extend(feed.next_page().await.unwrap());
    }
    assert_eq!(rest.len(), 4);
    assert!(rest.iter().all(|p| p.id != first[0].id));
}

#[tokio::test]
async fn post_lifecycle_with_likes_and_saves() {
    let store = embedded();
    let ana = signed_up(Arc::new(store.connect()), "ana").await;
    let a = user_id(&ana).await;
    let posts = Posts::new(ana.clone());

    let post = posts
        .create(NewPost {
            user_id: a.clone(),
            caption: "market day".into(),
            file: upload("m.png"),
            location: Some("Sofia".into()),
            tags: Some("food, street".into()),
        })
        .await
        .unwrap();
    assert_eq!(post.tags, vec!["food", "street"]);
    assert!(post.image_url.contains(&post.image_id));

    let liked = posts.like(&post.id, &[a.clone(), a.clone()]).await.unwrap();
    assert_eq!(liked.likes, vec![a.clone()]);
    assert_eq!(posts.liked_by(&a).await.unwrap().len(), 1);

    let save = posts.save(&a, &post.id).await.unwrap();
    assert_eq!(posts.save(&a, &post.id).await.unwrap().id, save.id);
    assert_eq!(posts.saved_by(&a).await.unwrap().len(), 1);
    posts.unsave(&save.id).await.unwrap();
    assert!(posts.saved_by(&a).await.unwrap().is_empty());

    let old_image = post.image_id.clone();
    let edited = posts
        .update(UpdatePost {
            post_id: post.id.clone(),
            caption: "market night".into(),
            file: Some(upload("n.png")),
            location: None,
            tags: None,
        })
        .await
        .unwrap();
    assert_ne!(edited.image_id, old_image);
    assert!(ana.backend().get_file_bytes(&old_image).await.is_err());

    assert_eq!(posts.by_creator(&a).await.unwrap().len(), 1);
    posts.delete(&edited.id).await.unwrap();
    assert!(posts.by_id(&edited.id).await.is_err());
    assert!(ana.backend().get_file_bytes(&edited.image_id).await.is_err());
}

#[tokio::test]
async fn only_the_author_may_change_a_post() {
    let store = embedded();
    let ana = signed_up(Arc::new(store.connect()), "ana").await;
    let bora = signed_up(Arc::new(store.connect()), "bora").await;
    let (a, b) = (user_id(&ana).await, user_id(&bora).await);

    let post = Posts::new(ana.clone())
        .create(NewPost {
            user_id: a.clone(),
            caption: "harbour".into(),
            file: upload("h.png"),
            location: None,
            tags: None,
        })
        .await
        .unwrap();

    let as_bora = Posts::new(bora.clone());
    let forged = as_bora
        .create(NewPost {
            user_id: a.clone(),
            caption: "not mine".into(),
            file: upload("f.png"),
            location: None,
            tags: None,
        })
        .await;
    assert!(matches!(forged, Err(ClientError::Forbidden(_))));

    let edit = as_bora
        .update(UpdatePost {
            post_id: post.id.clone(),
            caption: "taken over".into(),
            file: None,
            location: None,
            tags: None,
        })
        .await;
    assert!(matches!(edit, Err(ClientError::Forbidden(_))));
    assert!(matches!(as_bora.delete(&post.id).await, Err(ClientError::Forbidden(_))));
    assert!(matches!(as_bora.save(&a, &post.id).await, Err(ClientError::Forbidden(_))));

    // anyone signed in may like it
    let liked = as_bora.like(&post.id, &[b.clone()]).await.unwrap();
    assert_eq!(liked.likes, vec![b]);
    assert_eq!(as_bora.by_id(&post.id).await.unwrap().caption, "harbour");
    assert!(ana.backend().get_file_bytes(&post.image_id).await.is_ok());
}

#[tokio::test]
async fn failed_post_write_surfaces_the_gateway_error() {
    let store = embedded();
    let flaky = FlakyBackend::new(store.connect());
    let ana = signed_up(flaky.clone(), "ana").await;
    let a = user_id(&ana).await;

    flaky.fail_creates_in(Some(Collection::Posts));
    let err = Posts::new(ana.clone())
        .create(NewPost {
            user_id: a,
            caption: "never".into(),
            file: upload("x.png"),
            location: None,
            tags: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Gateway(GatewayError::Unavailable(_))));
}

fn new_event(title: &str, country: &str) -> NewEvent {
    NewEvent {
        title: title.into(),
        description: "bring friends".into(),
        country: country.into(),
        date: Some(Utc::now() + Duration::days(3)),
        image: upload("e.png"),
        location: "Old town".into(),
    }
}

#[tokio::test]
async fn events_filter_by_country_and_track_attendees() {
    let store = embedded();
    let ana = signed_up(Arc::new(store.connect()), "ana").await;
    let bora = signed_up(Arc::new(store.connect()), "bora").await;
    let events = Events::new(ana.clone());

    let berlin = events.create(new_event("Berlin walk", "Germany")).await.unwrap();
    events.create(new_event("Tapas night", "Spain")).await.unwrap();

    let all = events.list_by_country(None).await.unwrap();
    assert_eq!(feed::filter_events(&all, Some("Germany"), "").len(), 1);
    assert_eq!(events.list_by_country(Some("Germany")).await.unwrap().len(), 1);
    assert_eq!(events.countries().await.unwrap(), vec!["Germany", "Spain"]);
    assert!(events.image_url(&berlin).unwrap().contains("/preview"));

    let as_bora = Events::new(bora.clone());
    let b = user_id(&bora).await;
    as_bora.attend(&berlin.id).await.unwrap();
    let attended = as_bora.attend(&berlin.id).await.unwrap();
    assert_eq!(attended.attendees, vec![b.clone()]);
    assert!(as_bora.unattend(&berlin.id).await.unwrap().attendees.is_empty());

    let update = UpdateEvent {
        title: "Hijack".into(),
        description: String::new(),
        country: "Germany".into(),
        date: berlin.date,
        location: String::new(),
        image: None,
    };
    assert!(matches!(
        as_bora.update(&berlin.id, update.clone()).await,
        Err(ClientError::Forbidden(_))
    ));
    assert!(matches!(as_bora.delete(&berlin.id).await, Err(ClientError::Forbidden(_))));

    let renamed = events
        .update(&berlin.id, UpdateEvent { title: "Berlin night walk".into(), ..update })
        .await
        .unwrap();
    assert_eq!(renamed.title, "Berlin night walk");
    assert_eq!(events.mine().await.unwrap().len(), 2);

    events.delete(&berlin.id).await.unwrap();
    assert_eq!(events.list_by_country(Some("Germany")).await.unwrap().len(), 0);
}

#[tokio::test]
async fn event_without_date_uploads_nothing() {
    let store = embedded();
    let ana = signed_up(Arc::new(store.connect()), "ana").await;
    let mut event = new_event("Someday", "Germany");
    event.date = None;

    let err = Events::new(ana.clone()).create(event).await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
}

#[tokio::test]
async fn forums_are_managed_by_their_creator() {
    let store = embedded();
    let ana = signed_up(Arc::new(store.connect()), "ana").await;
    let bora = signed_up(Arc::new(store.connect()), "bora").await;
    let forums = Forums::new(ana.clone());

    let bad = forums
        .create(NewForum {
            title: "Football".into(),
            description: String::new(),
            theme: "Sports".into(),
        })
        .await;
    assert!(matches!(bad, Err(ClientError::Validation(_))));

    let forum = forums
        .create(NewForum {
            title: "New in town".into(),
            description: "tips for arrivals".into(),
            theme: "Refugee crises".into(),
        })
        .await
        .unwrap();
    assert_eq!(forums.mine().await.unwrap().len(), 1);
    assert_eq!(forums.list().await.unwrap().len(), 1);

    let as_bora = Forums::new(bora.clone());
    assert!(matches!(
        as_bora.update(&forum.id, "Taken over", "").await,
        Err(ClientError::Forbidden(_))
    ));
    assert!(matches!(as_bora.delete(&forum.id).await, Err(ClientError::Forbidden(_))));

    let stream = as_bora.open_stream(&forum.id).await.unwrap();
    stream.send("where do I register?").await.unwrap();
    drop(stream);

    let renamed = forums.update(&forum.id, "New in the city", "tips").await.unwrap();
    assert_eq!(renamed.title, "New in the city");

    forums.delete(&forum.id).await.unwrap();
    assert!(forums.details(&forum.id).await.is_err());
    let leftover = ana
        .backend()
        .list_documents(Collection::ForumMessages, &[])
        .await
        .unwrap();
    assert!(leftover.documents.is_empty());
}

#[tokio::test]
async fn profile_update_refreshes_context_and_lists_others() {
    let store = embedded();
    let ana = signed_up(Arc::new(store.connect()), "ana").await;
    signed_up(Arc::new(store.connect()), "bora").await;
    let users = Users::new(ana.clone());
    let me = ana.current_user().await.unwrap();

    let updated = users
        .update(UpdateUser {
            user_id: me.id.clone(),
            name: "Ana I.".into(),
            bio: "photographer".into(),
            nationality: "Bulgaria".into(),
            image_id: me.image_id.clone(),
            image_url: me.image_url.clone(),
            file: Some(upload("me.png")),
        })
        .await
        .unwrap();
    assert!(updated.image_id.is_some());
    assert_eq!(ana.current_user().await.unwrap().bio, "photographer");

    let others = users.others(None).await.unwrap();
    assert_eq!(others.len(), 1);
    assert_eq!(others[0].username, "bora");
    assert_eq!(users.by_id(&me.id).await.unwrap().name, "Ana I.");
}
