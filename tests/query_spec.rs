use chrono::{DateTime, TimeZone, Utc};
use rocket_launches::db::Database;
use rocket_launches::models::*;
use rocket_launches::query::{FetchSpec, SortDescriptor, SortKey};
use speculate2::speculate;

fn create_test_list(db: &Database, title: &str) -> LaunchList {
    db.create_list(CreateListInput {
        title: title.to_string(),
    })
    .expect("Failed to create list")
}

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, d, 0, 0, 0).unwrap()
}

fn create(db: &Database, list: &LaunchList, name: Option<&str>, date: Option<u32>) -> Launch {
    db.create_launch(&CreateLaunchInput {
        name: name.map(str::to_string),
        launch_date: date.map(day),
        list_id: list.id,
        ..Default::default()
    })
    .expect("Failed to create launch")
}

fn names(launches: &[Launch]) -> Vec<String> {
    launches
        .iter()
        .map(|l| {
            format!(
                "{}@{}",
                l.name.as_deref().unwrap_or("-"),
                l.launch_date.map(|d| d.format("%d").to_string()).unwrap_or_else(|| "-".into())
            )
        })
        .collect()
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
        let list = create_test_list(&db, "Main");
    }

    describe "fetch specifications" {
        it "returns all launches in insertion order when unsorted" {
            create(&db, &list, Some("Charlie"), Some(3));
            create(&db, &list, Some("Alpha"), Some(1));
            create(&db, &list, Some("Bravo"), Some(2));

            let launches = db.fetch_launches(&FetchSpec::all()).expect("Query failed");
            assert_eq!(names(&launches), vec!["Charlie@03", "Alpha@01", "Bravo@02"]);
        }

        it "sorts by launch date ascending" {
            create(&db, &list, Some("Late"), Some(20));
            create(&db, &list, Some("Undated"), None);
            create(&db, &list, Some("Early"), Some(2));

            let launches = db.fetch_launches(&FetchSpec::sorted_by_launch_date()).expect("Query failed");
            assert_eq!(names(&launches), vec!["Undated@-", "Early@02", "Late@20"]);
        }

        it "sorts by name then launch date ascending" {
            create(&db, &list, Some("Falcon"), Some(9));
            create(&db, &list, Some("Atlas"), Some(5));
            create(&db, &list, Some("Falcon"), Some(1));

            let launches = db.fetch_launches(&FetchSpec::sorted_by_name_and_launch_date()).expect("Query failed");
            assert_eq!(names(&launches), vec!["Atlas@05", "Falcon@01", "Falcon@09"]);
        }

        it "returns only unviewed launches, newest first within a name" {
            let a = create(&db, &list, Some("A"), Some(1));
            let b = create(&db, &list, Some("B"), Some(2));
            let c = create(&db, &list, Some("C"), Some(3));
            let a_later = create(&db, &list, Some("A"), Some(7));
            db.mark_viewed(b.id).expect("Failed to mark viewed");

            let launches = db.fetch_launches(&FetchSpec::unviewed()).expect("Query failed");
            let ids: Vec<_> = launches.iter().map(|l| l.id).collect();
            assert_eq!(ids, vec![a_later.id, a.id, c.id]);
        }

        it "restricts the list query to unviewed members of that list" {
            let other = create_test_list(&db, "Other");
            let kept = create(&db, &list, Some("Kept"), Some(1));
            let viewed = create(&db, &list, Some("Viewed"), Some(2));
            create(&db, &other, Some("Elsewhere"), Some(3));
            db.mark_viewed(viewed.id).expect("Failed to mark viewed");

            let launches = db.fetch_launches(&FetchSpec::in_list(&list)).expect("Query failed");
            assert_eq!(launches, vec![kept]);
        }

        it "includes launches added to the list after creation" {
            let other = create_test_list(&db, "Other");
            let moved = create(&db, &other, Some("Moved"), Some(1));
            db.add_to_list(moved.id, list.id).expect("Failed to add");

            let launches = db.fetch_launches(&FetchSpec::in_list(&list)).expect("Query failed");
            assert_eq!(launches, vec![moved]);
        }

        it "filters by every tag in the tag set" {
            let both = db.create_launch(&CreateLaunchInput {
                name: Some("Both".to_string()),
                tag_titles: vec!["crewed".to_string(), "reused".to_string()],
                list_id: list.id,
                ..Default::default()
            }).expect("Failed");
            db.create_launch(&CreateLaunchInput {
                name: Some("One".to_string()),
                tag_titles: vec!["crewed".to_string()],
                list_id: list.id,
                ..Default::default()
            }).expect("Failed");

            let spec = FetchSpec::all().tagged_with(["crewed", "reused"]);
            let launches = db.fetch_launches(&spec).expect("Query failed");
            assert_eq!(launches, vec![both]);

            let crewed = db.fetch_launches(&FetchSpec::all().tagged_with(["crewed"])).expect("Query failed");
            assert_eq!(crewed.len(), 2);
        }
    }

    describe "live queries" {
        it "reflects a committed write on the next read" {
            let live = db.live(FetchSpec::unviewed()).expect("Failed to subscribe");
            assert!(live.results().expect("Read failed").is_empty());

            let launch = create(&db, &list, Some("New"), Some(1));
            assert!(live.is_stale());
            assert_eq!(live.results().expect("Read failed"), vec![launch.clone()]);

            db.mark_viewed(launch.id).expect("Failed to mark viewed");
            assert!(live.results().expect("Read failed").is_empty());
        }

        it "does not go stale on an idempotent mark_viewed" {
            let launch = create(&db, &list, Some("Seen"), Some(1));
            db.mark_viewed(launch.id).expect("Failed to mark viewed");

            let live = db.live(FetchSpec::all()).expect("Failed to subscribe");
            db.mark_viewed(launch.id).expect("Failed to mark viewed");
            assert!(!live.is_stale());
        }

        it "re-sorts in place without refetching" {
            create(&db, &list, Some("Bravo"), Some(1));
            create(&db, &list, Some("Alpha"), Some(9));

            let live = db.live(FetchSpec::in_list(&list).with_sort(vec![
                SortDescriptor::ascending(SortKey::Name),
            ])).expect("Failed to subscribe");
            assert_eq!(names(&live.results().expect("Read failed")), vec!["Alpha@09", "Bravo@01"]);

            live.set_sort(vec![SortDescriptor::ascending(SortKey::LaunchDate)]).expect("Failed to re-sort");
            assert_eq!(names(&live.results().expect("Read failed")), vec!["Bravo@01", "Alpha@09"]);
            assert_eq!(
                live.spec().expect("Spec unavailable").sort,
                vec![SortDescriptor::ascending(SortKey::LaunchDate)]
            );
        }

        it "shares a sort change with every consumer of the subscription" {
            create(&db, &list, Some("Bravo"), Some(1));
            create(&db, &list, Some("Alpha"), Some(9));

            let live = db.live(FetchSpec::sorted_by_name_and_launch_date()).expect("Failed to subscribe");
            let other_view = live.clone();
            let revision = other_view.revision();

            live.set_sort(vec![SortDescriptor::ascending(SortKey::LaunchDate)]).expect("Failed to re-sort");

            assert!(other_view.revision() > revision);
            assert_eq!(names(&other_view.results().expect("Read failed")), vec!["Bravo@01", "Alpha@09"]);
        }

        it "applies a swapped sort to launches written afterwards" {
            let live = db.live(FetchSpec::sorted_by_name_and_launch_date()).expect("Failed to subscribe");
            live.set_sort(vec![SortDescriptor::ascending(SortKey::LaunchDate)]).expect("Failed to re-sort");

            create(&db, &list, Some("Zulu"), Some(1));
            create(&db, &list, Some("Alpha"), Some(5));

            assert_eq!(names(&live.results().expect("Read failed")), vec!["Zulu@01", "Alpha@05"]);
        }

        it "matches a fresh fetch after re-sorting tied launches" {
            create(&db, &list, Some("Same"), Some(4));
            create(&db, &list, Some("Same"), Some(4));
            create(&db, &list, Some("Other"), Some(4));

            let live = db.live(FetchSpec::sorted_by_launch_date()).expect("Failed to subscribe");
            let by_name = vec![SortDescriptor::ascending(SortKey::Name)];
            live.set_sort(by_name.clone()).expect("Failed to re-sort");

            let fresh = db.fetch_launches(&FetchSpec::all().with_sort(by_name)).expect("Query failed");
            assert_eq!(live.results().expect("Read failed"), fresh);
        }
    }
}
